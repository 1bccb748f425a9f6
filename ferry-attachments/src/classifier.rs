//! Inline or bulk placement for outbound attachments.
//!
//! An attachment travels inline only when it is smaller than the threshold
//! and its identity can be written into the envelope markup as an `NCName`.
//! Anything else goes through the bulk store.

use ferry_common::ConfigurationError;
use serde::{Deserialize, Serialize};

/// 512 KiB
pub const DEFAULT_THRESHOLD: u64 = 512 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementDecision {
    Inline,
    Bulk,
}

impl PlacementDecision {
    #[must_use]
    pub const fn is_bulk(self) -> bool {
        matches!(self, Self::Bulk)
    }
}

/// Returns true when `identity` is a valid XML `NCName`.
///
/// The first character must be a letter or `_`. Later characters may also
/// be digits, `-`, `.` or the middle dot. Colons are never allowed.
#[must_use]
pub fn is_ncname(identity: &str) -> bool {
    let mut chars = identity.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    threshold: u64,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Classifier {
    /// # Errors
    ///
    /// A zero threshold would send every attachment through the bulk store
    /// and is rejected.
    pub fn new(threshold: u64) -> Result<Self, ConfigurationError> {
        if threshold == 0 {
            return Err(ConfigurationError::invalid(
                "large_attachment_threshold",
                "must be greater than zero",
            ));
        }

        Ok(Self { threshold })
    }

    #[must_use]
    pub const fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Name validity is checked before size.
    #[must_use]
    pub fn classify(&self, size: u64, identity: &str) -> PlacementDecision {
        if !is_ncname(identity) || size >= self.threshold {
            PlacementDecision::Bulk
        } else {
            PlacementDecision::Inline
        }
    }
}
