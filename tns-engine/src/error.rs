use tns_core::models::{ConfigError, MarketId, ModelId};

/// Failures that stop a node from completing a cycle.
///
/// Missing records, unreachable neighbors and absent measurements are not
/// among them: those are logged and the node carries on with defaults.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The node configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A model panicked while another market held it
    #[error("model {0} is poisoned")]
    Poisoned(ModelId),
    /// A market's balancing thread panicked
    #[error("balancing market {0} panicked")]
    Panicked(MarketId),
    /// Shutdown was requested while balancing
    #[error("balancing was cancelled")]
    Cancelled,
}
