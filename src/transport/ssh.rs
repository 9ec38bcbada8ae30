//! SSH transport implementation using russh.

use std::sync::{Arc, Mutex};

use log::warn;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg};
use tokio::io::AsyncWriteExt;

use super::config::{AuthMethod, ConnectionTarget, HostKeyVerification, SshOptions};
use crate::error::{Result, TransportError};

/// SSH transport wrapping a russh client session.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(
        target: &ConnectionTarget,
        auth: &AuthMethod,
        opts: &SshOptions,
    ) -> std::result::Result<Self, TransportError> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(opts.timeout),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: target.host.clone(),
            port: target.port,
            host_key_verification: opts.host_key_verification.clone(),
            known_hosts_path: opts.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        // Connect to the server
        let mut session = tokio::time::timeout(
            opts.timeout,
            client::connect(ssh_config, (target.host.as_str(), target.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(opts.timeout))?
        .map_err(|e| {
            // If check_server_key stored a detailed error, use that instead
            // of the generic russh::Error::UnknownKey
            if let Some(hk_err) = host_key_error.lock().unwrap().take() {
                hk_err
            } else {
                TransportError::Ssh(e)
            }
        })?;

        // Authenticate
        Self::authenticate(&mut session, target, auth).await?;

        Ok(Self { session })
    }

    /// Authenticate with the server.
    ///
    /// An unsuccessful [`russh::client::AuthResult`] means the server
    /// rejected the credentials; callers that need to tell rejection
    /// apart from transport failures match on
    /// [`TransportError::AuthenticationFailed`].
    async fn authenticate(
        session: &mut Handle<SshHandler>,
        target: &ConnectionTarget,
        auth: &AuthMethod,
    ) -> std::result::Result<(), TransportError> {
        let success = match auth {
            AuthMethod::Password(password) => session
                .authenticate_password(&target.user, password)
                .await?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_deref())
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                // Get the best RSA hash algorithm supported by the server
                let hash_alg = session.best_supported_rsa_hash().await?.flatten();

                session
                    .authenticate_publickey(
                        &target.user,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: target.user.clone(),
            });
        }

        Ok(())
    }

    /// Open a plain session channel on this connection.
    pub async fn open_session(&self) -> std::result::Result<Channel<Msg>, russh::Error> {
        self.session.channel_open_session().await
    }

    /// Execute a command on the remote host, passing its stdout and
    /// stderr through to the operator's terminal.
    ///
    /// Returns the remote exit status, or `None` if the channel closed
    /// without reporting one.
    pub async fn execute(&self, command: &str) -> Result<Option<u32>> {
        let mut channel = self
            .open_session()
            .await
            .map_err(TransportError::Ssh)?;
        channel
            .exec(true, command)
            .await
            .map_err(TransportError::Ssh)?;

        let mut stdout = tokio::io::stdout();
        let mut stderr = tokio::io::stderr();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
                ChannelMsg::ExtendedData { data, ext: 1 } => {
                    stderr.write_all(&data).await?;
                    stderr.flush().await?;
                }
                ChannelMsg::ExitStatus { exit_status: code } => {
                    exit_status = Some(code);
                }
                _ => {}
            }
        }

        Ok(exit_status)
    }

    /// Close the connection.
    pub async fn close(self) -> std::result::Result<(), TransportError> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Try a public-key-only SSH handshake and classify the result.
///
/// - `Ok(true)`: key-based login works; the connection is closed again
///   without opening a session.
/// - `Ok(false)`: the server rejected the key — the expected state of a
///   host that has not been provisioned yet.
/// - `Err(..)`: anything else (network, protocol, unreadable key) and
///   therefore a real failure for this host.
pub async fn check_key_auth(
    target: &ConnectionTarget,
    private_key_path: &std::path::Path,
    opts: &SshOptions,
) -> std::result::Result<bool, TransportError> {
    let auth = AuthMethod::PrivateKey {
        path: private_key_path.to_path_buf(),
        passphrase: None,
    };

    match SshTransport::connect(target, &auth, opts).await {
        Ok(transport) => {
            if let Err(e) = transport.close().await {
                warn!("closing {} after auth check: {}", target.socket_addr(), e);
            }
            Ok(true)
        }
        Err(TransportError::AuthenticationFailed { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<std::path::PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    // Unknown host — learn the key
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    Ok(true)
                }
                Err(e) => {
                    // Key changed — store detailed error and reject
                    *self.host_key_error.lock().unwrap() = Some(e);
                    Ok(false)
                }
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    // Unknown host — reject in strict mode
                    *self.host_key_error.lock().unwrap() =
                        Some(TransportError::HostKeyUnknown {
                            host: self.host.clone(),
                            port: self.port,
                        });
                    Ok(false)
                }
                Err(e) => {
                    // Key changed — store detailed error and reject
                    *self.host_key_error.lock().unwrap() = Some(e);
                    Ok(false)
                }
            },
        }
    }
}
