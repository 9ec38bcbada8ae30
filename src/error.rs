//! Error types for keyseed.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for keyseed operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Script transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Local keypair errors
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    /// The host pattern resolved to an empty target list
    #[error("No hosts resolved from pattern '{pattern}'")]
    NoHosts { pattern: String },

    /// Failed to read the password from the terminal
    #[error("Password prompt failed: {0}")]
    PasswordPrompt(#[source] io::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// The server rejected the offered credentials
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Connection or handshake timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Host key changed since it was last recorded
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged {
        host: String,
        port: u16,
        line: usize,
    },

    /// Host key is not present in known_hosts (strict mode)
    #[error("Unknown host key for {host}:{port}")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts file could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Script transfer errors (local staging, streaming, remote sink).
#[derive(Error, Debug)]
pub enum TransferError {
    /// Could not write the script to its local staging path
    #[error("Failed to stage script at '{path}': {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// SSH error while opening the sink session or streaming bytes
    #[error("Stream to remote sink failed: {0}")]
    Stream(russh::Error),

    /// The remote sink process reported a non-zero exit status
    #[error("Remote sink exited with status {0}")]
    SinkFailed(u32),

    /// The channel closed before the sink reported an exit status
    #[error("Remote sink closed without an exit status")]
    SinkNoStatus,
}

/// Local keypair provisioning errors.
#[derive(Error, Debug)]
pub enum KeyError {
    /// Key generation or encoding failed
    #[error("Key generation failed: {0}")]
    Generate(#[from] ssh_key::Error),

    /// Could not read or write a key file
    #[error("Key file '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using keyseed's Error.
pub type Result<T> = std::result::Result<T, Error>;
