//! Attachment placement for the ferry exchange adapter.
//!
//! Outbound attachments are sorted into inline or bulk by the
//! [`Classifier`]. Inbound attachments are staged through a
//! [`PlacementStrategy`], which hands out one [`StagedBuffer`] per attachment
//! and takes it back once the cycle is over.

pub mod backends;
pub mod buffer;
pub mod classifier;
pub mod config;
pub mod error;
pub mod strategy;

pub use backends::{FileStrategy, MemoryStrategy, TestStrategy};
pub use buffer::{BufferState, StagedBuffer, StagedWriter};
pub use classifier::{Classifier, DEFAULT_THRESHOLD, PlacementDecision, is_ncname};
pub use config::StrategyConfig;
pub use error::PlacementError;
pub use strategy::{AcquireRequest, PlacementStrategy};
