use thiserror::Error;

/// Failures of the frame-counter device. Every variant is fatal for a run.
#[derive(Error, Debug)]
pub enum CounterError {
    /// The vendor driver library could not be loaded.
    #[error("counter driver library `{library}` unavailable: {reason}")]
    LibraryUnavailable { library: String, reason: String },

    /// The driver library lacks an entry point the counter needs.
    #[error("counter driver is missing symbol `{0}`")]
    MissingSymbol(&'static str),

    /// The driver returned a negative status.
    #[error("counter driver call `{call}` failed with error {code}: {message}")]
    Driver {
        call: &'static str,
        code: i32,
        message: String,
    },

    /// The port name could not be handed to the driver.
    #[error("invalid counter port `{0}`")]
    InvalidPort(String),

    /// The counter was read after it had been released.
    #[error("counter already released")]
    Released,
}
