//! SSH transport layer wrapping russh.
//!
//! This module provides the low-level SSH connection management,
//! handling connection setup, authentication, key verification and
//! remote command execution.

pub mod config;
mod ssh;

pub use config::{AuthMethod, ConnectionTarget, HostKeyVerification, SshOptions};
pub use ssh::{SshTransport, check_key_auth};
