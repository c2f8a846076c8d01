use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// `output` is only captured for clients that cannot leak credentials.
    #[error("{dialect} query failed: {status}{}", .output.as_deref().map(|o| format!("\nOutput: {o}")).unwrap_or_default())]
    Query {
        dialect: &'static str,
        status: std::process::ExitStatus,
        output: Option<String>,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("error reading status.phase of {0}: not a string")]
    InvalidPhase(String),

    #[error("timeout waiting for {0}")]
    Timeout(String),

    #[error("command did not finish within {0:?}")]
    Deadline(Duration),

    #[error("verification failed: expected {expected}, got {actual}")]
    Verification { expected: String, actual: String },

    #[error("RACE CONDITION DETECTED: Pod marked Ready but {engine} not accepting connections after {attempts} attempts{}", .last.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    RaceDetected {
        engine: &'static str,
        attempts: u32,
        last: Option<Box<Error>>,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Short alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Attaches a human readable prefix to an error, the way the CLI reports it.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|err| Error::Context {
            context: context.into(),
            source: Box::new(err.into()),
        })
    }
}
