use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A chunk reference that does not follow the `{prefix}@{offset}` form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkRefError {
    #[error("chunk reference `{0}` is missing the `@` separator")]
    MissingSeparator(String),
    #[error("chunk reference `{reference}` has an invalid offset `{offset}`")]
    InvalidOffset { reference: String, offset: String },
}

/// No qualifying event arrived for the active conversation within the window.
///
/// Delivered through the processor's timeout callback after the active
/// conversation has already been interrupted and the state returned to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("conversation timed out after {}ms without a response", .timeout.as_millis())]
pub struct ConversationTimeout {
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
