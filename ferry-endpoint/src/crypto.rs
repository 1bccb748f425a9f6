//! Process-wide crypto provider registration.

use std::sync::OnceLock;

use ferry_common::{ConfigurationError, internal, tracing};
use sha2::{Digest, Sha256};

static PROVIDER: OnceLock<CryptoProvider> = OnceLock::new();

/// The registered provider. Only a fingerprint of the license key is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoProvider {
    fingerprint: String,
}

impl CryptoProvider {
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn fingerprint(license_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(license_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Register the crypto provider for this process.
///
/// Safe to call more than once: the first registration wins, and a later
/// call with a different key only logs a warning.
///
/// # Errors
///
/// Fails when the license key is blank.
pub fn init_crypto_provider(license_key: &str) -> Result<&'static CryptoProvider, ConfigurationError> {
    let license_key = license_key.trim();
    if license_key.is_empty() {
        return Err(ConfigurationError::invalid(
            "crypto_license_key",
            "must not be empty",
        ));
    }

    let requested = fingerprint(license_key);
    let provider = PROVIDER.get_or_init(|| {
        internal!(level = INFO, "Registering crypto provider");
        CryptoProvider {
            fingerprint: requested.clone(),
        }
    });

    if provider.fingerprint != requested {
        tracing::warn!("Crypto provider already registered with a different license key");
    }

    Ok(provider)
}

/// The registered provider, if [`init_crypto_provider`] has run.
#[must_use]
pub fn crypto_provider() -> Option<&'static CryptoProvider> {
    PROVIDER.get()
}
