//! The error type shared by every provisioning step.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Shorthand for results whose error is [Error].
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can make a provisioning run fail.
///
/// All variants are fatal for the run that produced them. Nothing is retried internally and no
/// files written before the failure are rolled back.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more task inputs were rejected before any side effect took place.
    #[error("invalid task configuration: {}", FieldErrors(.0))]
    Validation(Vec<FieldError>),

    /// A setter was called after the task left [TaskState::NotStarted].
    ///
    /// [TaskState::NotStarted]: crate::core::task::TaskState::NotStarted
    #[error("cannot change `{field}` of {type_id}: execution has already started")]
    Locked {
        type_id: String,
        field: &'static str,
    },

    #[error("failed to create directory: {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("wasn't able to write ssh key: {}", .path.display())]
    WriteKey {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to restrict permissions on {}", .path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("wasn't able to write ssh config: {}", .path.display())]
    AppendConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The key generator could not produce a key pair.
    #[error("key generation failed ({provider}): {reason}")]
    KeyGeneration { provider: String, reason: String },

    /// The host could not be trusted or the public key could not be submitted.
    #[error("trust registration for {host} failed: {reason}")]
    Trust { host: String, reason: String },

    /// The completion store could not be read or updated.
    #[error("completion store {}: {reason}", .path.display())]
    Store { path: PathBuf, reason: String },
}

/// A single rejected input field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        FieldError {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.reason)
    }
}

// Joins field errors with "; " for the Validation message.
struct FieldErrors<'a>(&'a [FieldError]);

impl fmt::Display for FieldErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}
