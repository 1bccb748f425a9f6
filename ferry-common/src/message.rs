use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{
    headers::{self, HeaderError, Headers},
    protocol::ProtocolMessage,
};

/// Mime type used when neither the handler nor the broker supplies one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Content payload of an [`ExchangeMessage`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    /// The broker's message itself, handed over untouched.
    Protocol(Box<ProtocolMessage>),
}

impl Body {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Short name of the variant, for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Protocol(_) => "protocol message",
        }
    }
}

/// The handler's verdict on a consumed message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Disposition {
    Accepted,
    Rejected,
    #[default]
    Unknown,
}

impl Disposition {
    /// The acknowledgment flag, or `None` when nothing should be acknowledged.
    #[must_use]
    pub const fn as_flag(self) -> Option<bool> {
        match self {
            Self::Accepted => Some(true),
            Self::Rejected => Some(false),
            Self::Unknown => None,
        }
    }
}

impl From<Option<bool>> for Disposition {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Accepted,
            Some(false) => Self::Rejected,
            None => Self::Unknown,
        }
    }
}

/// Where the bytes of an attachment live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentContent {
    Memory(Arc<[u8]>),
    File(PathBuf),
}

impl AttachmentContent {
    /// Read the whole content.
    ///
    /// # Errors
    ///
    /// Fails when a file-backed content can no longer be read.
    pub async fn read_all(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::Memory(bytes) => Ok(bytes.to_vec()),
            Self::File(path) => tokio::fs::read(path).await,
        }
    }
}

impl From<Vec<u8>> for AttachmentContent {
    fn from(value: Vec<u8>) -> Self {
        Self::Memory(value.into())
    }
}

/// Placement metadata of an attachment.
///
/// Populated from the broker on the inbound path; on the outbound path any
/// field set by the handler overrides the computed value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentHeaders {
    pub mime_type: Option<String>,
    /// Detached signature, base64 encoded.
    pub signature: Option<String>,
    pub passport_id: Option<String>,
    pub uuid: Option<String>,
    pub name: Option<String>,
    pub length: Option<u64>,
    /// Content checksum, base64 encoded.
    pub hash: Option<String>,
    pub content_ref: Option<PathBuf>,
}

impl AttachmentHeaders {
    /// The decoded detached signature, if one was set.
    ///
    /// # Errors
    ///
    /// Fails when the stored signature is not valid base64.
    pub fn signature_bytes(&self) -> Result<Option<Vec<u8>>, HeaderError> {
        self.signature
            .as_deref()
            .map(|encoded| {
                STANDARD.decode(encoded).map_err(|_| HeaderError {
                    key: "signature".to_string(),
                    expected: "base64 string",
                    value: encoded.to_string(),
                })
            })
            .transpose()
    }

    pub fn set_signature(&mut self, signature: &[u8]) {
        self.signature = Some(STANDARD.encode(signature));
    }
}

/// A binary payload travelling with an [`ExchangeMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub headers: AttachmentHeaders,
    pub content: AttachmentContent,
}

impl Attachment {
    pub fn new(id: impl Into<String>, content: impl Into<AttachmentContent>) -> Self {
        Self {
            id: id.into(),
            headers: AttachmentHeaders::default(),
            content: content.into(),
        }
    }

    /// Stage a file from disk as an outbound attachment.
    ///
    /// The attachment is keyed and named by the file name, its declared
    /// length is the file size, and `uuid` (when non-empty) fixes the bulk
    /// directory used if the attachment ends up out-of-band.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be inspected or has no file name.
    pub async fn from_file(
        path: impl AsRef<Path>,
        mime_type: impl Into<String>,
        uuid: Option<&str>,
    ) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;

        Ok(Self {
            id: name.clone(),
            headers: AttachmentHeaders {
                mime_type: Some(mime_type.into()),
                uuid: uuid.filter(|uuid| !uuid.is_empty()).map(str::to_string),
                name: Some(name),
                length: Some(metadata.len()),
                content_ref: Some(path.to_path_buf()),
                ..AttachmentHeaders::default()
            },
            content: AttachmentContent::File(path.to_path_buf()),
        })
    }

    /// The display name, falling back to the id.
    #[must_use]
    pub fn name(&self) -> &str {
        self.headers.name.as_deref().unwrap_or(&self.id)
    }

    /// The mime type, falling back to [`DEFAULT_MIME_TYPE`].
    #[must_use]
    pub fn mime_type(&self) -> &str {
        self.headers.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE)
    }
}

/// The generic unit of work passed to and from handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeMessage {
    pub body: Body,
    pub headers: Headers,
    pub attachments: Vec<Attachment>,
    failure: Option<String>,
}

impl ExchangeMessage {
    #[must_use]
    pub fn new(body: Body) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Mark the exchange as failed. The consumer treats this the same as a
    /// handler error.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// The disposition recorded in the accepted header.
    ///
    /// # Errors
    ///
    /// Fails when the header holds something other than a boolean.
    pub fn disposition(&self) -> Result<Disposition, HeaderError> {
        self.headers.boolean(headers::ACCEPTED).map(Disposition::from)
    }

    pub fn set_disposition(&mut self, disposition: Disposition) {
        match disposition.as_flag() {
            Some(flag) => self.headers.set(headers::ACCEPTED, flag),
            None => {
                self.headers.remove(headers::ACCEPTED);
            }
        }
    }

    pub fn accept(&mut self) {
        self.set_disposition(Disposition::Accepted);
    }

    pub fn reject(&mut self) {
        self.set_disposition(Disposition::Rejected);
    }

    #[must_use]
    pub fn attachment(&self, id: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|attachment| attachment.id == id)
    }

    /// Copy every attachment into `root`, one file per attachment named
    /// after the attachment name. Returns the written paths in order.
    ///
    /// # Errors
    ///
    /// Fails on the first attachment that cannot be read or written.
    pub async fn save_attachments(&self, root: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
        let root = root.as_ref();
        let mut written = Vec::with_capacity(self.attachments.len());

        for attachment in &self.attachments {
            let file_name = Path::new(attachment.name()).file_name().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("attachment {} has no usable name", attachment.id),
                )
            })?;
            let target = root.join(file_name);

            tracing::debug!(attachment = attachment.name(), target = %target.display(), "Saving attachment");
            let bytes = attachment.content.read_all().await?;
            tokio::fs::write(&target, bytes).await?;
            written.push(target);
        }

        Ok(written)
    }
}
