//! CLI error types with exit code handling
//!
//! Library errors are flattened into [`CliError`], which carries the help
//! text shown by miette and maps to a process exit code.

use miette::Diagnostic;
use packctl_core::CoreError;
use packctl_kube::PackageError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// The request was rejected before or while talking to the cluster
    #[error("{message}")]
    #[diagnostic(code(packctl::cli::invalid))]
    Invalid {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The controller reported a failure
    #[error("{message}")]
    #[diagnostic(code(packctl::cli::reconcile))]
    Reconcile {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(packctl::cli::timeout))]
    Timeout {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Talking to the API server failed
    #[error("{message}")]
    #[diagnostic(
        code(packctl::cli::cluster),
        help("check the current kubeconfig context and that the API server is reachable")
    )]
    Cluster { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(packctl::cli::io))]
    Io { message: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(
        code(packctl::cli::config),
        help("fix or remove the packctl config file")
    )]
    Config { message: String },

    #[error("{message}")]
    #[diagnostic(code(packctl::cli::usage))]
    Usage { message: String },

    #[error("Operation cancelled")]
    #[diagnostic(code(packctl::cli::cancelled))]
    Cancelled,

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(packctl::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Invalid { .. } => exit_codes::INVALID_REQUEST,
            CliError::Reconcile { .. } => exit_codes::RECONCILE_FAILED,
            CliError::Timeout { .. } => exit_codes::TIMEOUT,
            CliError::Cluster { .. } => exit_codes::UNAVAILABLE,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Cancelled => exit_codes::INTERRUPTED,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a usage error (user provided inconsistent arguments)
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::ValuesFile { .. } | CoreError::Io(_) => CliError::Io { message },
            CoreError::ConfigParse(_) | CoreError::InvalidConfig { .. } | CoreError::MissingField { .. } => {
                CliError::Config { message }
            }
            CoreError::InvalidConstraint { .. } => CliError::Invalid {
                message,
                help: Some("use an exact version such as 1.2.3 or a range such as '>=1.0.0 <2.0.0'".to_string()),
            },
        }
    }
}

impl From<PackageError> for CliError {
    fn from(err: PackageError) -> Self {
        let help = err.hint();
        let message = err.to_string();
        match err {
            PackageError::Core(core) => core.into(),
            PackageError::Dependent { source, .. } if matches!(*source, PackageError::Api(_)) => {
                CliError::Cluster { message }
            }
            PackageError::Api(_) | PackageError::Store(_) => CliError::Cluster { message },
            PackageError::ReconcileFailed { .. } => CliError::Reconcile { message, help },
            PackageError::Timeout { .. } => CliError::Timeout { message, help },
            PackageError::Cancelled => CliError::Cancelled,
            PackageError::Internal(_) | PackageError::Serialization(_) => CliError::Internal { message },
            _ => CliError::Invalid { message, help },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
