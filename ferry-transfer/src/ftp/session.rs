//! One FTP control connection.

use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use ferry_common::{incoming, outgoing, tracing};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};

use super::reply::Reply;
use crate::{Credentials, TransferError};

const DEFAULT_PORT: u16 = 21;

/// Split `host[:port]`, defaulting the port to 21.
pub fn split_address(address: &str) -> Result<(&str, u16), TransferError> {
    let address = address.trim();
    match address.split_once(':') {
        None if !address.is_empty() => Ok((address, DEFAULT_PORT)),
        Some((host, port)) if !host.is_empty() => port
            .parse::<u16>()
            .map(|port| (host, port))
            .map_err(|_| TransferError::InvalidAddress(address.to_string())),
        _ => Err(TransferError::InvalidAddress(address.to_string())),
    }
}

pub struct FtpSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    timeout: Duration,
}

impl FtpSession {
    /// Connect and read the server greeting.
    pub async fn connect(address: &str, timeout_after: Duration) -> Result<Self, TransferError> {
        let (host, port) = split_address(address)?;

        let stream = timeout(timeout_after, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransferError::Connect {
                address: address.to_string(),
                reason: format!("timed out after {}ms", timeout_after.as_millis()),
            })?
            .map_err(|err| TransferError::Connect {
                address: address.to_string(),
                reason: err.to_string(),
            })?;

        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let mut session = Self {
            reader: BufReader::new(reader),
            writer,
            peer,
            timeout: timeout_after,
        };

        let mut greeting = session.read_reply("greeting").await?;
        while greeting.is_preliminary() {
            greeting = session.read_reply("greeting").await?;
        }

        if !greeting.is_success() {
            return Err(TransferError::Connect {
                address: address.to_string(),
                reason: format!("{} {}", greeting.code, greeting.message()),
            });
        }

        tracing::debug!(%address, "Connected to bulk store");
        Ok(session)
    }

    /// `USER`, then `PASS` when the server asks for it.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), TransferError> {
        let reply = self
            .command(&format!("USER {}", credentials.login), "USER")
            .await?;

        let reply = if reply.is_intermediate() {
            self.send(&format!("PASS {}", credentials.password), "PASS ****")
                .await?;
            self.read_reply("PASS").await?
        } else {
            reply
        };

        if reply.is_success() {
            Ok(())
        } else {
            Err(TransferError::Login {
                login: credentials.login.clone(),
                code: reply.code,
                message: reply.message(),
            })
        }
    }

    pub async fn binary(&mut self) -> Result<(), TransferError> {
        let reply = self.command("TYPE I", "TYPE").await?;
        Self::expect_success(reply, "TYPE")
    }

    pub async fn make_directory(&mut self, directory: &str) -> Result<(), TransferError> {
        let reply = self.command(&format!("MKD {directory}"), "MKD").await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(TransferError::CreateDirectory {
                directory: directory.to_string(),
                code: reply.code,
                message: reply.message(),
            })
        }
    }

    pub async fn change_directory(&mut self, directory: &str) -> Result<(), TransferError> {
        let reply = self.command(&format!("CWD {directory}"), "CWD").await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(TransferError::ChangeDirectory {
                directory: directory.to_string(),
                code: reply.code,
                message: reply.message(),
            })
        }
    }

    /// `STOR file_name` over a passive data connection.
    pub async fn store(
        &mut self,
        file_name: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, TransferError> {
        let mut data = self.passive().await?;
        self.open_transfer("STOR", file_name).await?;

        let copied = tokio::io::copy(content, &mut data).await?;
        data.shutdown().await?;
        drop(data);

        self.finish_transfer(file_name).await?;
        Ok(copied)
    }

    /// `RETR file_name` over a passive data connection.
    pub async fn retrieve(
        &mut self,
        file_name: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransferError> {
        let mut data = self.passive().await?;
        self.open_transfer("RETR", file_name).await?;

        let copied = tokio::io::copy(&mut data, sink).await?;
        sink.flush().await?;
        drop(data);

        self.finish_transfer(file_name).await?;
        Ok(copied)
    }

    /// `QUIT` and drop the connection.
    pub async fn quit(mut self) -> Result<(), TransferError> {
        let reply = self.command("QUIT", "QUIT").await?;
        if !reply.is_success() {
            tracing::debug!(code = reply.code, "Negative reply to QUIT: {}", reply.message());
        }
        self.writer.shutdown().await?;
        Ok(())
    }

    async fn passive(&mut self) -> Result<TcpStream, TransferError> {
        let reply = self.command("PASV", "PASV").await?;
        if reply.code != 227 {
            return Err(TransferError::UnexpectedReply {
                command: "PASV",
                code: reply.code,
                message: reply.message(),
            });
        }

        let (ip, port) = reply.passive_endpoint()?;
        let ip = if ip.is_unspecified() {
            self.peer.ip()
        } else {
            IpAddr::V4(ip)
        };

        timeout(self.timeout, TcpStream::connect((ip, port)))
            .await
            .map_err(|_| TransferError::Timeout("data connection"))?
            .map_err(TransferError::from)
    }

    async fn open_transfer(
        &mut self,
        verb: &'static str,
        file_name: &str,
    ) -> Result<(), TransferError> {
        let reply = self.command(&format!("{verb} {file_name}"), verb).await?;
        if reply.is_preliminary() {
            Ok(())
        } else {
            Err(TransferError::Transfer {
                path: file_name.to_string(),
                code: reply.code,
                message: reply.message(),
            })
        }
    }

    async fn finish_transfer(&mut self, file_name: &str) -> Result<(), TransferError> {
        let reply = self.read_reply("transfer completion").await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(TransferError::Transfer {
                path: file_name.to_string(),
                code: reply.code,
                message: reply.message(),
            })
        }
    }

    async fn command(
        &mut self,
        command: &str,
        waiting_for: &'static str,
    ) -> Result<Reply, TransferError> {
        self.send(command, command).await?;
        self.read_reply(waiting_for).await
    }

    async fn send(&mut self, command: &str, logged_as: &str) -> Result<(), TransferError> {
        outgoing!("{logged_as}");
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self, waiting_for: &'static str) -> Result<Reply, TransferError> {
        let first = self.read_line(waiting_for).await?;
        let parsed = Reply::parse_line(&first)?;
        let mut lines = vec![parsed.message];

        if !parsed.is_last {
            loop {
                let line = self.read_line(waiting_for).await?;
                if Reply::terminates(&line, parsed.code) {
                    lines.push(line.trim_end().get(4..).unwrap_or_default().to_string());
                    break;
                }
                lines.push(line.trim_end().to_string());
            }
        }

        let reply = Reply::new(parsed.code, lines);
        incoming!("{} {}", reply.code, reply.message());
        Ok(reply)
    }

    async fn read_line(&mut self, waiting_for: &'static str) -> Result<String, TransferError> {
        let mut line = String::new();
        let read = timeout(self.timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| TransferError::Timeout(waiting_for))??;

        if read == 0 {
            return Err(TransferError::ConnectionClosed);
        }

        Ok(line)
    }

    fn expect_success(reply: Reply, command: &'static str) -> Result<(), TransferError> {
        if reply.is_success() {
            Ok(())
        } else {
            Err(TransferError::UnexpectedReply {
                command,
                code: reply.code,
                message: reply.message(),
            })
        }
    }
}
