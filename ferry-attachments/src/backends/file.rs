use std::{
    io,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use ferry_common::{Attachment, ConfigurationError, ExchangeMessage};
use serde::{Deserialize, Deserializer};
use tokio::fs::OpenOptions;

use crate::{AcquireRequest, BufferState, PlacementError, PlacementStrategy, StagedBuffer};

/// Stages attachments as files under `<root>/<message id>/<attachment name>`.
///
/// Finalizing records the staging path as the attachment's content
/// reference, so handlers can move or copy the file instead of reading it.
/// Release deletes the file and, once it is empty, the message directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStrategy {
    root: PathBuf,
}

impl Default for FileStrategy {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
        }
    }
}

impl<'de> Deserialize<'de> for FileStrategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileStrategyHelper {
            #[serde(default = "FileStrategy::default_root")]
            path: PathBuf,
        }

        let helper = FileStrategyHelper::deserialize(deserializer)?;
        Self::new(helper.path).map_err(serde::de::Error::custom)
    }
}

impl FileStrategy {
    /// # Errors
    ///
    /// The root must be absolute, must not contain `..`, and must not sit
    /// inside a system directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ConfigurationError> {
        let root = root.into();
        Self::validate_root(&root)?;
        Ok(Self { root })
    }

    fn default_root() -> PathBuf {
        std::env::temp_dir().join("ferry").join("attachments")
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_root(root: &Path) -> Result<(), ConfigurationError> {
        if root.components().any(|component| component == Component::ParentDir) {
            return Err(ConfigurationError::invalid(
                "attachment_strategy.path",
                format!("cannot contain '..' components: {}", root.display()),
            ));
        }

        if !root.is_absolute() {
            return Err(ConfigurationError::invalid(
                "attachment_strategy.path",
                format!("must be absolute: {}", root.display()),
            ));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];
        if let Some(prefix) = sensitive_prefixes
            .iter()
            .find(|prefix| root.starts_with(prefix))
        {
            return Err(ConfigurationError::invalid(
                "attachment_strategy.path",
                format!("cannot be in system directory {prefix}: {}", root.display()),
            ));
        }

        Ok(())
    }

    /// Turn an identifier from the broker into a single path component.
    fn component(name: &str) -> String {
        let cleaned: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
            .collect();

        match cleaned.as_str() {
            "" | "." | ".." => format!("_{cleaned}"),
            _ => cleaned,
        }
    }
}

impl FileStrategy {
    /// Create an empty file for `name` that did not exist before, trying
    /// `<name>`, `<ordinal>-<name>`, then `<ordinal>-<n>-<name>`.
    async fn claim(directory: &Path, name: &str, ordinal: usize) -> Result<PathBuf, PlacementError> {
        let mut path = directory.join(name);
        let mut collisions = 0usize;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(_) => return Ok(path),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err.into()),
            }

            path = directory.join(if collisions == 0 {
                format!("{ordinal}-{name}")
            } else {
                format!("{ordinal}-{collisions}-{name}")
            });
            collisions += 1;
        }
    }
}

#[async_trait]
impl PlacementStrategy for FileStrategy {
    async fn acquire(
        &self,
        _exchange: &ExchangeMessage,
        request: &AcquireRequest<'_>,
    ) -> Result<Option<StagedBuffer>, PlacementError> {
        request.validate()?;

        let directory = self.root.join(Self::component(request.message_id));
        tokio::fs::create_dir_all(&directory).await?;

        let name = if request.attachment_name.is_empty() {
            request.attachment_id
        } else {
            request.attachment_name
        };
        let path = Self::claim(&directory, &Self::component(name), request.ordinal).await?;

        tracing::debug!(path = %path.display(), ordinal = request.ordinal, total = request.total, "Staging attachment on disk");
        Ok(Some(StagedBuffer::on_disk(request, path)))
    }

    async fn finalize(
        &self,
        _exchange: &ExchangeMessage,
        attachment: &mut Attachment,
        buffer: &StagedBuffer,
    ) -> Result<bool, PlacementError> {
        if buffer.state() != BufferState::Finalized {
            return Err(PlacementError::NotWritten(buffer.attachment_id().to_string()));
        }

        attachment.headers.length = Some(buffer.length());
        attachment.headers.content_ref = buffer.path().map(Path::to_path_buf);
        Ok(true)
    }

    async fn release(&self, buffer: &mut StagedBuffer) {
        let directory = buffer.path().and_then(Path::parent).map(Path::to_path_buf);

        match buffer.discard().await {
            Ok(false) => return,
            Ok(true) => {}
            Err(err) => {
                tracing::warn!(attachment = buffer.attachment_id(), "Failed to delete staged attachment: {err}");
                return;
            }
        }

        // Succeeds only once the last attachment of the message is gone
        if let Some(directory) = directory
            && directory != self.root
            && let Err(err) = tokio::fs::remove_dir(&directory).await
        {
            tracing::trace!(directory = %directory.display(), "Keeping message directory: {err}");
        }
    }
}
