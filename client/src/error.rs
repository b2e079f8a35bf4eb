use thiserror::Error;

/// Errors surfaced by the tunnel client.
#[derive(Debug, Error)]
pub enum Error {
    /// No port argument was supplied.
    #[error("missing port argument")]
    MissingArgument,

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("failed to load configuration: {0}")]
    Configuration(#[from] config::ConfigError),

    /// The collaborator binary could not be started.
    #[error("failed to start {binary} (is it installed?): {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The collaborator went away before emitting the awaited event.
    #[error("tunnel closed before the {0} event was received")]
    CollaboratorClosed(&'static str),

    #[error("local service at {address} is unreachable: {reason}")]
    Probe { address: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
