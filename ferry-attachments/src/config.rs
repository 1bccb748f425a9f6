use std::{path::Path, sync::Arc};

use serde::Deserialize;

use crate::{FileStrategy, MemoryStrategy, PlacementStrategy};

/// Where inbound attachments are staged while the handler runs
///
/// # Examples
///
/// Staged in memory (the default):
/// ```ron
/// Endpoint (
///     attachment_strategy: (type: "Memory"),
/// )
/// ```
///
/// Staged on disk:
/// ```ron
/// Endpoint (
///     attachment_strategy: (
///         type: "File",
///         path: "/var/lib/ferry/attachments",
///     ),
/// )
/// ```
///
/// Omitting `path` stages under `$TMPDIR/ferry/attachments`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum StrategyConfig {
    #[default]
    Memory,
    File(FileStrategy),
}

impl StrategyConfig {
    /// The staging root for disk-backed strategies.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(strategy) => Some(strategy.root()),
            Self::Memory => None,
        }
    }

    #[must_use]
    pub fn into_strategy(self) -> Arc<dyn PlacementStrategy> {
        match self {
            Self::Memory => Arc::new(MemoryStrategy::new()),
            Self::File(strategy) => Arc::new(strategy),
        }
    }
}
