use std::time::Duration;

use thiserror::Error;

/// Error kinds returned by collaborator calls. The supervisor decides per
/// kind whether to retry, degrade, or abort; nothing here is implicitly
/// fatal except what the supervisor promotes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("market feed: {0}")]
    Feed(String),

    #[error("trading transport: {0}")]
    Transport(String),

    #[error("broker rejected request: {0}")]
    Rejected(String),

    #[error("symbol catalog: {0}")]
    Catalog(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Transient faults are recovered locally with a fallback value and a
    /// logged warning; they must never abort a cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Feed(_)
                | EngineError::Transport(_)
                | EngineError::Catalog(_)
                | EngineError::Timeout(_)
        )
    }
}
