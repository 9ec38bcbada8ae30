//! SSH connection configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    AcceptNew,

    /// Accept all keys without checking.
    ///
    /// This is the default here, unlike any sane general-purpose SSH
    /// client: the tool exists to bootstrap machines that were imaged
    /// minutes ago, on a network the operator controls. Pass a stricter
    /// mode when that assumption does not hold.
    #[default]
    Disabled,
}

/// One SSH endpoint: host, port and remote user. Immutable per attempt.
#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Remote username.
    pub user: String,
}

impl ConnectionTarget {
    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authentication method for SSH connections.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Password authentication.
    Password(String),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<String>,
    },
}

/// Connection behavior shared by every attempt in a run.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Handshake timeout.
    pub timeout: Duration,

    /// Probe timeout for the pre-connection TCP dial.
    pub probe_timeout: Duration,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file, if not the user default.
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            probe_timeout: crate::probe::PROBE_TIMEOUT,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }
}
