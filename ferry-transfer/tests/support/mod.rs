pub mod mock_ftp;
