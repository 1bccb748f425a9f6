//! Mock FTP server for exercising the bulk transfer channel
#![allow(dead_code)] // Test utility module - not all methods used in every test
//!
//! Supports the subset of FTP the channel speaks: `USER`, `PASS`, `TYPE`,
//! `PASV`, `MKD`, `CWD`, `STOR`, `RETR` and `QUIT`. Uploaded files are kept
//! in memory keyed by `<directory>/<name>`.

use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

#[derive(Debug, Clone)]
struct FtpResponse {
    code: u16,
    message: String,
}

impl FtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockFtpConfig {
    greeting: Vec<String>,
    user_response: FtpResponse,
    pass_response: FtpResponse,
    mkd_response: Option<FtpResponse>,
    stor_response: Option<FtpResponse>,
    drop_on_quit: bool,
    hang_on_greeting: bool,
}

impl Default for MockFtpConfig {
    fn default() -> Self {
        Self {
            greeting: vec!["Mock FTP Server".to_string()],
            user_response: FtpResponse::new(331, "Password required"),
            pass_response: FtpResponse::new(230, "Logged in"),
            mkd_response: None,
            stor_response: None,
            drop_on_quit: false,
            hang_on_greeting: false,
        }
    }
}

#[derive(Default)]
struct Storage {
    directories: HashSet<String>,
    files: HashMap<String, Vec<u8>>,
}

pub struct MockFtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<String>>>,
    storage: Arc<RwLock<Storage>>,
}

impl MockFtpServer {
    #[must_use]
    pub fn builder() -> MockFtpServerBuilder {
        MockFtpServerBuilder::default()
    }

    #[must_use]
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Command lines received, across every session, in order
    pub async fn commands(&self) -> Vec<String> {
        self.commands.read().await.clone()
    }

    /// Command verbs received, across every session, in order
    pub async fn verbs(&self) -> Vec<String> {
        self.commands
            .read()
            .await
            .iter()
            .map(|line| line.split(' ').next().unwrap_or_default().to_string())
            .collect()
    }

    pub async fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.storage.read().await.files.get(path).cloned()
    }

    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockFtpConfig>,
        commands: Arc<RwLock<Vec<String>>>,
        storage: Arc<RwLock<Storage>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        if config.hang_on_greeting {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(());
        }

        let last = config.greeting.len().saturating_sub(1);
        for (index, line) in config.greeting.iter().enumerate() {
            let separator = if index == last { ' ' } else { '-' };
            writer
                .write_all(format!("220{separator}{line}\r\n").as_bytes())
                .await?;
        }
        writer.flush().await?;

        let mut cwd = String::new();
        let mut passive: Option<TcpListener> = None;
        let mut line = String::new();

        loop {
            line.clear();
            let Ok(read) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }

            let command_line = line.trim().to_string();
            commands.write().await.push(command_line.clone());

            let (verb, argument) = command_line
                .split_once(' ')
                .map_or((command_line.as_str(), ""), |(verb, argument)| (verb, argument));

            let response = match verb.to_uppercase().as_str() {
                "USER" => config.user_response.clone(),
                "PASS" => config.pass_response.clone(),
                "TYPE" => FtpResponse::new(200, "Type set to I"),
                "PASV" => {
                    let listener = TcpListener::bind("127.0.0.1:0").await?;
                    let port = listener.local_addr()?.port();
                    passive = Some(listener);
                    FtpResponse::new(
                        227,
                        format!(
                            "Entering Passive Mode (127,0,0,1,{},{})",
                            port >> 8,
                            port & 0xff
                        ),
                    )
                }
                "MKD" => match &config.mkd_response {
                    Some(response) => response.clone(),
                    None => {
                        if storage.write().await.directories.insert(argument.to_string()) {
                            FtpResponse::new(257, format!("\"{argument}\" created"))
                        } else {
                            FtpResponse::new(550, "Directory exists")
                        }
                    }
                },
                "CWD" => {
                    if storage.read().await.directories.contains(argument) {
                        cwd = argument.to_string();
                        FtpResponse::new(250, "Directory changed")
                    } else {
                        FtpResponse::new(550, "No such directory")
                    }
                }
                "STOR" => {
                    if let Some(response) = &config.stor_response {
                        response.clone()
                    } else if let Some(listener) = passive.take() {
                        writer
                            .write_all(&FtpResponse::new(150, "Ok to send data").to_bytes())
                            .await?;
                        writer.flush().await?;

                        let (mut data, _) = listener.accept().await?;
                        let mut content = Vec::new();
                        data.read_to_end(&mut content).await?;
                        storage
                            .write()
                            .await
                            .files
                            .insert(Self::path(&cwd, argument), content);
                        FtpResponse::new(226, "Transfer complete")
                    } else {
                        FtpResponse::new(425, "Use PASV first")
                    }
                }
                "RETR" => {
                    let content = storage
                        .read()
                        .await
                        .files
                        .get(&Self::path(&cwd, argument))
                        .cloned();
                    match (content, passive.take()) {
                        (None, _) => FtpResponse::new(550, "File not found"),
                        (Some(_), None) => FtpResponse::new(425, "Use PASV first"),
                        (Some(content), Some(listener)) => {
                            writer
                                .write_all(
                                    &FtpResponse::new(150, "Opening BINARY mode data connection")
                                        .to_bytes(),
                                )
                                .await?;
                            writer.flush().await?;

                            let (mut data, _) = listener.accept().await?;
                            data.write_all(&content).await?;
                            data.shutdown().await?;
                            FtpResponse::new(226, "Transfer complete")
                        }
                    }
                }
                "QUIT" => {
                    if config.drop_on_quit {
                        return Ok(());
                    }
                    writer
                        .write_all(&FtpResponse::new(221, "Goodbye").to_bytes())
                        .await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => FtpResponse::new(502, "Command not implemented"),
            };

            writer.write_all(&response.to_bytes()).await?;
            writer.flush().await?;
        }
    }

    fn path(cwd: &str, name: &str) -> String {
        if cwd.is_empty() {
            name.to_string()
        } else {
            format!("{cwd}/{name}")
        }
    }
}

#[derive(Default)]
pub struct MockFtpServerBuilder {
    config: MockFtpConfig,
    files: Vec<(String, String, Vec<u8>)>,
}

impl MockFtpServerBuilder {
    /// Send a multi-line greeting
    #[must_use]
    pub fn with_greeting_lines(mut self, lines: &[&str]) -> Self {
        self.config.greeting = lines.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn with_pass_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.pass_response = FtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mkd_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mkd_response = Some(FtpResponse::new(code, message));
        self
    }

    #[must_use]
    pub fn with_stor_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.stor_response = Some(FtpResponse::new(code, message));
        self
    }

    /// Close the control connection instead of answering `QUIT`
    #[must_use]
    pub const fn with_drop_on_quit(mut self) -> Self {
        self.config.drop_on_quit = true;
        self
    }

    /// Accept connections but never greet
    #[must_use]
    pub const fn with_silent_greeting(mut self) -> Self {
        self.config.hang_on_greeting = true;
        self
    }

    /// Pre-populate `<directory>/<name>`
    #[must_use]
    pub fn with_file(mut self, directory: &str, name: &str, content: &[u8]) -> Self {
        self.files
            .push((directory.to_string(), name.to_string(), content.to_vec()));
        self
    }

    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockFtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let mut storage = Storage::default();
        for (directory, name, content) in self.files {
            storage.directories.insert(directory.clone());
            storage
                .files
                .insert(MockFtpServer::path(&directory, &name), content);
        }

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let storage = Arc::new(RwLock::new(storage));

        let server = MockFtpServer {
            addr,
            commands: Arc::clone(&commands),
            storage: Arc::clone(&storage),
        };

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = Arc::clone(&config);
                let commands = Arc::clone(&commands);
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    if let Err(err) =
                        MockFtpServer::handle_client(stream, config, commands, storage).await
                    {
                        eprintln!("Mock FTP session error: {err}");
                    }
                });
            }
        });

        Ok(server)
    }
}
