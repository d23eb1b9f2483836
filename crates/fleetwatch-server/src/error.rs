//! Error types for the monitor binary.

/// Top-level error for the monitor binary.
///
/// Each variant wraps a subsystem error so `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: fleetwatch_stream::ConfigError,
    },

    /// The gateway server failed to start or stopped with an error.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: fleetwatch_stream::ServerError,
    },

    /// The tick loop task panicked or was aborted.
    #[error("tick loop error: {message}")]
    TickLoop {
        /// Description of the failure.
        message: String,
    },
}
