//! Signing service boundary.
//!
//! Endpoints sign business content and compute a digest and detached
//! signature for every outbound attachment. The cryptography itself is
//! supplied by an implementation of [`Signer`].

use std::{fmt, path::PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Key material unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

pub trait Signer: fmt::Debug + Send + Sync {
    /// Personal signature over the serialized business content, if the
    /// signer produces one.
    fn sign_content(&self, xml: &str) -> Result<Option<String>, SignerError>;

    /// Start checksumming and signing one attachment. The content is fed in
    /// chunks, so attachments never need to fit in memory.
    fn attachment(&self) -> Box<dyn AttachmentSigner>;

    /// Seal content that is already in memory.
    fn seal(&self, bytes: &[u8]) -> Result<AttachmentSeal, SignerError> {
        let mut signer = self.attachment();
        signer.update(bytes);
        signer.finish()
    }
}

/// Incremental checksum and detached signature over one attachment.
pub trait AttachmentSigner: Send {
    fn update(&mut self, chunk: &[u8]);

    /// Checksum and signature over everything passed to `update`.
    fn finish(self: Box<Self>) -> Result<AttachmentSeal, SignerError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentSeal {
    pub digest: Vec<u8>,
    pub signature: Vec<u8>,
}

/// SHA-256 checksums and no signatures, for endpoints whose content is
/// signed further down the line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestSigner;

impl Signer for DigestSigner {
    fn sign_content(&self, _xml: &str) -> Result<Option<String>, SignerError> {
        Ok(None)
    }

    fn attachment(&self) -> Box<dyn AttachmentSigner> {
        Box::new(Sha256Digest(Sha256::new()))
    }
}

struct Sha256Digest(Sha256);

impl AttachmentSigner for Sha256Digest {
    fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    fn finish(self: Box<Self>) -> Result<AttachmentSeal, SignerError> {
        Ok(AttachmentSeal {
            digest: self.0.finalize().to_vec(),
            signature: Vec::new(),
        })
    }
}

/// Where a signer finds its key material.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignerSettings {
    #[serde(default)]
    pub certificate_store: Option<PathBuf>,
    #[serde(default)]
    pub certificate_alias: Option<String>,
    #[serde(default)]
    pub private_key_alias: Option<String>,
    #[serde(default)]
    pub private_key_password: Option<String>,
    #[serde(default)]
    pub key_store_type: Option<String>,
}

impl fmt::Debug for SignerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerSettings")
            .field("certificate_store", &self.certificate_store)
            .field("certificate_alias", &self.certificate_alias)
            .field("private_key_alias", &self.private_key_alias)
            .field(
                "private_key_password",
                &self.private_key_password.as_ref().map(|_| "<redacted>"),
            )
            .field("key_store_type", &self.key_store_type)
            .finish()
    }
}
