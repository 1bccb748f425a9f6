use std::time::Duration;

use ferry_common::ConfigurationError;
use serde::{Deserialize, Serialize};

use crate::{Coordinates, Credentials};

/// Bulk store endpoint settings.
///
/// The address is optional so endpoints that never see bulk attachments do
/// not need one; [`TransferConfig::coordinates`] fails when it is missing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default = "TransferConfig::default_login")]
    pub login: String,

    #[serde(default = "TransferConfig::default_password")]
    pub password: String,

    /// Connect and per-reply timeout in milliseconds
    #[serde(default = "TransferConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts callers make per attachment after the first fails
    #[serde(default = "TransferConfig::default_retries")]
    pub retries: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            address: None,
            login: Self::default_login(),
            password: Self::default_password(),
            timeout_ms: Self::default_timeout_ms(),
            retries: Self::default_retries(),
        }
    }
}

impl TransferConfig {
    fn default_login() -> String {
        "anonymous".to_string()
    }

    fn default_password() -> String {
        "ferry".to_string()
    }

    const fn default_timeout_ms() -> u64 {
        1000
    }

    const fn default_retries() -> u32 {
        5
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The first attempt plus `retries`.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.login, &self.password)
    }

    /// Coordinates for `<directory>/<file_name>` on the configured store,
    /// using the configured credentials.
    ///
    /// # Errors
    ///
    /// Fails when no address is configured.
    pub fn coordinates(
        &self,
        directory: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Result<Coordinates, ConfigurationError> {
        self.coordinates_with(directory, file_name, self.credentials())
    }

    /// As [`TransferConfig::coordinates`], with credentials supplied by the
    /// broker for this one transfer.
    ///
    /// # Errors
    ///
    /// Fails when no address is configured.
    pub fn coordinates_with(
        &self,
        directory: impl Into<String>,
        file_name: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Coordinates, ConfigurationError> {
        let address = self
            .address
            .clone()
            .ok_or(ConfigurationError::MissingField("transfer.address"))?;

        Ok(Coordinates {
            address,
            directory: directory.into(),
            file_name: file_name.into(),
            credentials,
        })
    }

    /// # Errors
    ///
    /// Fails on an empty address or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(address) = &self.address
            && address.trim().is_empty()
        {
            return Err(ConfigurationError::invalid(
                "transfer.address",
                "must not be empty",
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigurationError::invalid(
                "transfer.timeout_ms",
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}
