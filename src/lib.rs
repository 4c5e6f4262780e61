//! Per-host SSH identity setup.
//!
//! For a user name and a host (e.g. `alice` and `github.com`), ssh-setup generates a key pair,
//! stores it in the user's SSH directory with owner-only permissions on the private key, appends a
//! `Host` block to the SSH client configuration, and adds the host to `known_hosts`.
//!
//! # Program flow
//!
//! 1. A [core::SshTask] is constructed directly or loaded from a [core::Workflow] file.
//!
//! 2. [core::SshTask::execute] is called with a set of [core::Services]: a
//!    [crypto::KeyGenerator], a [store::CompletionStore] that remembers finished tasks across runs,
//!    and a [trust::TrustRegistrar].
//!
//! 3. If the store reports the task identity as completed, nothing happens. Otherwise the SSH
//!    directory is created if needed, keys are written, the configuration block is appended,
//!    the host is trusted, and the identity is marked completed.
//!
//! Running the same task again is therefore safe and does nothing once it has succeeded.

pub mod client;
pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod files;
pub mod logger;
pub mod store;
pub mod trust;

#[doc(inline)]
pub use error::{Error, Result};
