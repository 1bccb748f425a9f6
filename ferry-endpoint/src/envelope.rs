//! Translation between protocol attachments and generic attachments.
//!
//! Inbound, [`EnvelopeBuilder::decompose`] stages every protocol attachment
//! through the configured [`PlacementStrategy`] and exposes the result on the
//! [`ExchangeMessage`]. Outbound, [`EnvelopeBuilder::assemble`] seals each
//! generic attachment in one streaming pass and turns it into an inline or
//! bulk protocol attachment.

use std::{
    path::PathBuf,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use ferry_attachments::{
    AcquireRequest, Classifier, PlacementDecision, PlacementError, PlacementStrategy,
    StagedBuffer,
};
use ferry_common::{
    Attachment, AttachmentContent, AttachmentHeaders, ConfigurationError, ExchangeMessage,
    ProtocolAttachment, ProtocolMessage, incoming, internal, outgoing,
    protocol::TransportDetails, tracing,
};
use ferry_transfer::{BulkTransfer, Coordinates, Credentials, TransferConfig, TransferError};
use sha2::{Digest, Sha256};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf},
};
use uuid::Uuid;

use crate::{
    error::EnvelopeError,
    signer::{AttachmentSeal, Signer},
};

/// Pause before the second transfer attempt; doubled for every attempt after.
const RETRY_PAUSE: Duration = Duration::from_millis(50);

const CHUNK_SIZE: usize = 64 * 1024;

/// Where an outbound attachment travels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Inline,
    Bulk(Coordinates),
}

#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    strategy: Arc<dyn PlacementStrategy>,
    transfer: Arc<dyn BulkTransfer>,
    transfer_config: TransferConfig,
    classifier: Classifier,
    signer: Arc<dyn Signer>,
}

impl EnvelopeBuilder {
    pub fn new(
        strategy: Arc<dyn PlacementStrategy>,
        transfer: Arc<dyn BulkTransfer>,
        transfer_config: TransferConfig,
        classifier: Classifier,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            strategy,
            transfer,
            transfer_config,
            classifier,
            signer,
        }
    }

    #[must_use]
    pub fn strategy(&self) -> &Arc<dyn PlacementStrategy> {
        &self.strategy
    }

    #[must_use]
    pub const fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Stage the attachments of `message` and expose them on `exchange`.
    ///
    /// Every buffer handed out by the strategy is pushed onto `staged` before
    /// it is filled, so the caller can release all of them whatever happens
    /// here. Returns the number of attachments exposed to the handler.
    ///
    /// # Errors
    ///
    /// Fails on the first attachment that cannot be staged or downloaded.
    pub async fn decompose(
        &self,
        message: &ProtocolMessage,
        exchange: &mut ExchangeMessage,
        staged: &mut Vec<StagedBuffer>,
    ) -> Result<usize, EnvelopeError> {
        let attachments = message.attachments();
        let total = attachments.len();
        let mut exposed = 0;

        for (ordinal, attachment) in attachments.iter().enumerate() {
            let (name, signature) = match attachment {
                ProtocolAttachment::Inline { id, signature, .. } => (id.as_str(), signature),
                ProtocolAttachment::Bulk {
                    file_ref,
                    signature,
                    ..
                } => (file_ref.as_str(), signature),
            };

            let request = AcquireRequest {
                message_id: message.message_id(),
                attachment_id: attachment.key(),
                attachment_name: name,
                mime_type: attachment.mime_type(),
                signature,
                ordinal,
                total,
            };

            let Some(buffer) = self.strategy.acquire(exchange, &request).await? else {
                internal!(
                    level = DEBUG,
                    "Placement strategy skipped attachment {} of {}",
                    request.attachment_id,
                    request.message_id
                );
                continue;
            };

            staged.push(buffer);
            let buffer = staged
                .last_mut()
                .ok_or_else(|| PlacementError::Internal("staged buffer missing".to_string()))?;

            self.fill(attachment, buffer).await?;

            let mut generic = Attachment::new(attachment.key(), buffer.seal().await?);
            generic.headers = inbound_headers(attachment, name);

            if self.strategy.finalize(exchange, &mut generic, buffer).await? {
                exchange.attachments.push(generic);
                exposed += 1;
            }
        }

        Ok(exposed)
    }

    async fn fill(
        &self,
        attachment: &ProtocolAttachment,
        buffer: &mut StagedBuffer,
    ) -> Result<u64, EnvelopeError> {
        let mut writer = buffer.writer().await?;

        let written = match attachment {
            ProtocolAttachment::Inline { content, .. } => {
                writer.write_all(content).await?;
                content.len() as u64
            }
            ProtocolAttachment::Bulk {
                uuid,
                file_ref,
                transport,
                ..
            } => {
                let coordinates = self.transfer_config.coordinates_with(
                    uuid.as_str(),
                    file_ref.as_str(),
                    Credentials::new(&transport.login, &transport.password),
                )?;
                self.download(&coordinates, &mut writer).await?
            }
        };

        writer.shutdown().await?;
        Ok(written)
    }

    /// Pick the placement of one outbound attachment of `size` bytes.
    ///
    /// # Errors
    ///
    /// A bulk placement needs a configured transfer address.
    pub fn place(
        &self,
        attachment: &Attachment,
        size: u64,
    ) -> Result<Placement, ConfigurationError> {
        match self.classifier.classify(size, attachment.name()) {
            PlacementDecision::Inline => Ok(Placement::Inline),
            PlacementDecision::Bulk => {
                let uuid = attachment
                    .headers
                    .uuid
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                self.transfer_config
                    .coordinates(uuid, attachment.name())
                    .map(Placement::Bulk)
            }
        }
    }

    /// Turn the attachments of `exchange` into protocol attachments,
    /// uploading the bulk ones.
    ///
    /// Each attachment is checksummed and signed in one streaming pass.
    /// File-backed content is read again for the upload and must hash the
    /// same both times.
    ///
    /// # Errors
    ///
    /// Fails on the first attachment that cannot be read, signed or uploaded.
    pub async fn assemble(
        &self,
        exchange: &ExchangeMessage,
    ) -> Result<Vec<ProtocolAttachment>, EnvelopeError> {
        let mut assembled = Vec::with_capacity(exchange.attachments.len());

        for attachment in &exchange.attachments {
            let sealed = self.seal(&attachment.content).await?;
            let signature = match attachment.headers.signature_bytes()? {
                Some(signature) => signature,
                None => sealed.seal.signature.clone(),
            };

            let size = attachment.headers.length.unwrap_or(sealed.size);
            let mime_type = attachment.mime_type().to_string();
            let passport_id = attachment.headers.passport_id.clone();

            match self.place(attachment, size)? {
                Placement::Inline => {
                    internal!("Embedding {} ({size} bytes) inline", attachment.name());
                    assembled.push(ProtocolAttachment::Inline {
                        id: attachment.name().to_string(),
                        mime_type,
                        signature,
                        passport_id,
                        content: sealed.inline_content(attachment.name()).await?,
                    });
                }
                Placement::Bulk(coordinates) => {
                    let coordinates = self.upload(attachment, coordinates, &sealed).await?;
                    assembled.push(ProtocolAttachment::Bulk {
                        uuid: coordinates.directory,
                        mime_type,
                        signature,
                        passport_id,
                        file_ref: coordinates.file_name,
                        hash: STANDARD.encode(&sealed.seal.digest),
                        transport: TransportDetails {
                            login: coordinates.credentials.login,
                            password: coordinates.credentials.password,
                        },
                    });
                }
            }
        }

        Ok(assembled)
    }

    async fn seal(&self, content: &AttachmentContent) -> Result<Sealed, EnvelopeError> {
        match content {
            AttachmentContent::Memory(bytes) => Ok(Sealed {
                seal: self.signer.seal(bytes)?,
                size: bytes.len() as u64,
                source: Source::Memory(Arc::clone(bytes)),
            }),
            AttachmentContent::File(path) => {
                let mut file = File::open(path).await?;
                let mut signer = self.signer.attachment();
                let mut fingerprint = Sha256::new();
                let mut chunk = vec![0u8; CHUNK_SIZE];
                let mut size = 0;

                loop {
                    let read = file.read(&mut chunk).await?;
                    if read == 0 {
                        break;
                    }
                    signer.update(&chunk[..read]);
                    fingerprint.update(&chunk[..read]);
                    size += read as u64;
                }

                Ok(Sealed {
                    seal: signer.finish()?,
                    size,
                    source: Source::File {
                        path: path.clone(),
                        fingerprint: fingerprint.finalize().to_vec(),
                    },
                })
            }
        }
    }

    /// Upload `sealed`, retrying retryable failures. A directory generated
    /// for this attachment is replaced before every retry, since an earlier
    /// attempt may already have created it. Returns the coordinates of the
    /// attempt that succeeded.
    async fn upload(
        &self,
        attachment: &Attachment,
        mut coordinates: Coordinates,
        sealed: &Sealed,
    ) -> Result<Coordinates, EnvelopeError> {
        let attempts = self.transfer_config.attempts();
        let pinned = attachment.headers.uuid.is_some();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match &sealed.source {
                Source::Memory(bytes) => {
                    let mut reader = &bytes[..];
                    self.transfer.upload(&coordinates, &mut reader).await
                }
                Source::File { path, fingerprint } => {
                    let mut reader = FingerprintReader::new(File::open(path).await?);
                    let result = self.transfer.upload(&coordinates, &mut reader).await;
                    if result.is_ok() && reader.finish() != *fingerprint {
                        return Err(EnvelopeError::ContentChanged(attachment.name().to_string()));
                    }
                    result
                }
            };

            match result {
                Ok(stored) => {
                    outgoing!(level = DEBUG, "Uploaded {stored} bytes to {coordinates}");
                    return Ok(coordinates);
                }
                Err(err) if attempt < attempts && err.is_retryable() => {
                    pause(&coordinates, attempt, attempts, &err).await;
                    if !pinned {
                        coordinates.directory = Uuid::new_v4().to_string();
                    }
                }
                Err(source) => {
                    return Err(EnvelopeError::Transfer {
                        uuid: coordinates.directory,
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// Downloads straight into the staged buffer. An attempt that already
    /// wrote bytes cannot be repeated, so only clean failures are retried.
    async fn download<W>(&self, coordinates: &Coordinates, sink: &mut W) -> Result<u64, EnvelopeError>
    where
        W: AsyncWrite + Send + Unpin,
    {
        let attempts = self.transfer_config.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut counted = CountingWriter::new(sink);
            let result = self.transfer.download(coordinates, &mut counted).await;
            let written = counted.written;

            match result {
                Ok(copied) => {
                    incoming!(level = DEBUG, "Downloaded {copied} bytes from {coordinates}");
                    return Ok(copied);
                }
                Err(err) if written == 0 && attempt < attempts && err.is_retryable() => {
                    pause(coordinates, attempt, attempts, &err).await;
                }
                Err(source) => {
                    return Err(EnvelopeError::Transfer {
                        uuid: coordinates.directory.clone(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

async fn pause(coordinates: &Coordinates, attempt: u32, attempts: u32, err: &TransferError) {
    let delay = RETRY_PAUSE * 2u32.saturating_pow(attempt - 1);
    tracing::warn!(
        bulk = %coordinates,
        attempt,
        attempts,
        retry_in = ?delay,
        error = %err,
        "Bulk transfer failed, retrying"
    );
    tokio::time::sleep(delay).await;
}

fn inbound_headers(attachment: &ProtocolAttachment, name: &str) -> AttachmentHeaders {
    let mut headers = AttachmentHeaders {
        mime_type: Some(attachment.mime_type().to_string()),
        uuid: Some(attachment.key().to_string()),
        name: Some(name.to_string()),
        ..AttachmentHeaders::default()
    };

    match attachment {
        ProtocolAttachment::Inline {
            signature,
            passport_id,
            ..
        } => {
            headers.set_signature(signature);
            headers.passport_id.clone_from(passport_id);
        }
        ProtocolAttachment::Bulk {
            signature,
            passport_id,
            hash,
            ..
        } => {
            headers.set_signature(signature);
            headers.passport_id.clone_from(passport_id);
            headers.hash = Some(hash.clone());
        }
    }

    headers
}

/// Tracks how many bytes reached the inner writer.
struct CountingWriter<'a, W> {
    inner: &'a mut W,
    written: u64,
}

impl<'a, W> CountingWriter<'a, W> {
    const fn new(inner: &'a mut W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for CountingWriter<'_, W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut *this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.written += *n as u64;
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_shutdown(cx)
    }
}

/// An outbound attachment after its sealing pass.
struct Sealed {
    seal: AttachmentSeal,
    size: u64,
    source: Source,
}

enum Source {
    Memory(Arc<[u8]>),
    /// Read again on demand; `fingerprint` is the SHA-256 of the sealing pass.
    File { path: PathBuf, fingerprint: Vec<u8> },
}

impl Sealed {
    async fn inline_content(&self, name: &str) -> Result<Vec<u8>, EnvelopeError> {
        match &self.source {
            Source::Memory(bytes) => Ok(bytes.to_vec()),
            Source::File { path, fingerprint } => {
                let bytes = tokio::fs::read(path).await?;
                if Sha256::digest(&bytes).as_slice() != fingerprint.as_slice() {
                    return Err(EnvelopeError::ContentChanged(name.to_string()));
                }
                Ok(bytes)
            }
        }
    }
}

/// Hashes everything read through it.
struct FingerprintReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R> FingerprintReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> Vec<u8> {
        self.hasher.finalize().to_vec()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for FingerprintReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.hasher.update(&buf.filled()[before..]);
        }
        poll
    }
}
