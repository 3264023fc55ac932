//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.
//! Success, including a downgraded warning, exits 0.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Invalid request - unknown package, conflicting names, bad constraint
pub const INVALID_REQUEST: i32 = 2;

/// The controller reported a reconciliation failure
pub const RECONCILE_FAILED: i32 = 3;

/// Waiting for the controller timed out
pub const TIMEOUT: i32 = 4;

/// IO error - unreadable values or password file
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;

/// Cluster unavailable - kubeconfig or API server failure (EX_UNAVAILABLE)
pub const UNAVAILABLE: i32 = 69;

/// Configuration error - invalid packctl config file (EX_CONFIG)
pub const CONFIG_ERROR: i32 = 78;

/// Interrupted by Ctrl-C (128 + SIGINT)
pub const INTERRUPTED: i32 = 130;
