//! Error handling for binswap
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** inside the update engine ([`UpdateError`]), so each
//!    phase can decide whether a failure skips a source, aborts an attempt, or is
//!    simply logged.
//! 2. **User-friendly messages** at the CLI boundary ([`ErrorContext`]), with an
//!    actionable suggestion where one exists.
//!
//! # Error Categories
//!
//! - [`UpdateError::Parse`] - a remote payload held no usable build number
//! - [`UpdateError::Network`] - a probe or download failed in transit (timeouts included)
//! - [`UpdateError::FileSystem`] - staging, moving or scanning failed on disk
//! - [`UpdateError::Verification`] - the staged artifact is empty or truncated
//! - [`UpdateError::Launch`] - the swap plan could not be written or started
//!
//! None of these ever cross [`check_for_update`]; the orchestrator absorbs them and
//! reports a three-valued outcome instead. They surface to users only through the
//! CLI commands that expose individual components (`status`, `config`).
//!
//! [`check_for_update`]: crate::upgrade::UpdateOrchestrator::check_for_update
//!
//! # Examples
//!
//! ```rust,no_run
//! use binswap::core::{UpdateError, user_friendly_error};
//!
//! let err = UpdateError::Network {
//!     operation: "commit history probe".to_string(),
//!     reason: "connection refused".to_string(),
//! };
//! user_friendly_error(anyhow::Error::from(err)).display();
//! ```

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The error type for every fallible step of the update engine.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// A source answered, but nothing in its payload resolved to a build number.
    #[error("Failed to parse build number from {origin}: {reason}")]
    Parse {
        /// Name of the source or file the text came from
        origin: String,
        /// What was wrong with the payload
        reason: String,
    },

    /// A network operation failed, returned a non-success status, or timed out.
    #[error("Network error during {operation}: {reason}")]
    Network {
        /// The network operation that failed
        operation: String,
        /// Reason for the network failure
        reason: String,
    },

    /// A file system operation failed.
    #[error("File system error during {operation} on {}", .path.display())]
    FileSystem {
        /// The file system operation that failed
        operation: String,
        /// Path the operation was applied to
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The downloaded artifact failed the size checks.
    #[error("Downloaded artifact failed verification: {reason}")]
    Verification {
        /// What did not match
        reason: String,
    },

    /// The detached swap continuation could not be prepared or started.
    #[error("Failed to launch swap plan: {reason}")]
    Launch {
        /// Why the launch failed
        reason: String,
    },
}

impl UpdateError {
    /// Wrap an I/O error with the operation and path it came from.
    pub fn fs(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Build a network error from anything displayable (usually `reqwest::Error`).
    pub fn network(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Network {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this failure belongs to the transport class.
    ///
    /// Verification failures count as transport failures: a truncated body and a
    /// dropped connection are handled the same way.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Verification { .. })
    }
}

/// Error wrapper carrying a suggestion and details for terminal display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error, rendered as text
    pub error: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with no suggestion or details.
    #[must_use]
    pub fn new(error: impl fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion for resolving the error.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details explaining the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colours.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a suggestion where we know one.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        return create_error_context(update_error, &error);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(format!("{error:#}"))
                    .with_suggestion("Check ownership of the install directory or rerun with elevated permissions")
                    .with_details("binswap needs write access to the directory holding the versioned binaries");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(format!("{error:#}"))
                    .with_suggestion("Check that the install directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if error.downcast_ref::<toml::de::Error>().is_some() {
        return ErrorContext::new(format!("{error:#}"))
            .with_suggestion("Check the TOML syntax of your binswap config, or regenerate it with 'binswap config init'");
    }

    ErrorContext::new(format!("{error:#}"))
}

fn create_error_context(error: &UpdateError, chain: &anyhow::Error) -> ErrorContext {
    let message = format!("{chain:#}");
    match error {
        UpdateError::Network { .. } => ErrorContext::new(message)
            .with_suggestion("Check your network connection and the [remote] section of the config")
            .with_details("Remote sources are probed in order; each one is skipped on failure"),
        UpdateError::Parse { .. } => ErrorContext::new(message).with_suggestion(
            "Make sure the version marker file contains a build number such as 'v42' or 'Build 42'",
        ),
        UpdateError::FileSystem { .. } => ErrorContext::new(message)
            .with_suggestion("Check free space and permissions in the install directory"),
        UpdateError::Verification { .. } => ErrorContext::new(message)
            .with_suggestion("The download was incomplete; run 'binswap check' again later"),
        UpdateError::Launch { .. } => ErrorContext::new(message)
            .with_suggestion("Check that the system temp directory is writable")
            .with_details("The staged binary is kept and will be reused on the next check"),
    }
}
