//! Per-host key distribution.
//!
//! The orchestrator walks each resolved host through the same state
//! machine the tool has always had: probe the port, check whether
//! key-based login already works, fall back to password authentication,
//! push and run the provisioning script, then re-verify. One immutable
//! [`Outcome`] per host; hosts are processed strictly sequentially and
//! never retried.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use log::{info, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result, TransportError};
use crate::probe;
use crate::script::{KeyAction, RemoteScript};
use crate::transfer;
use crate::transport::{self, AuthMethod, ConnectionTarget, SshOptions, SshTransport};

/// Terminal result for one host.
#[derive(Debug)]
pub struct Outcome {
    pub host: String,
    pub success: bool,
    pub action: KeyAction,
    pub message: String,
}

impl Outcome {
    fn ok(host: &str, action: KeyAction) -> Self {
        Self {
            host: host.to_string(),
            success: true,
            action,
            message: String::new(),
        }
    }

    fn ok_with(host: &str, action: KeyAction, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::ok(host, action)
        }
    }

    fn failed(host: &str, action: KeyAction, message: impl Into<String>) -> Self {
        Self {
            host: host.to_string(),
            success: false,
            action,
            message: message.into(),
        }
    }

    /// Status column of the report line: `OK (ADD)`, `FAILED (DEL) - msg`.
    pub fn status(&self) -> String {
        let mut status = String::from(if self.success { "OK" } else { "FAILED" });
        status.push_str(" (");
        status.push_str(self.action.as_str());
        status.push(')');

        if !self.message.is_empty() {
            status.push_str(" - ");
            status.push_str(&self.message);
        }

        status
    }

    /// One report line, `<host>\t -> <status>`.
    pub fn report_line(&self) -> String {
        format!("{}\t -> {}", self.host, self.status())
    }
}

/// `true` if at least one host succeeded.
pub fn overall_success(outcomes: &[Outcome]) -> bool {
    outcomes.iter().any(|o| o.success)
}

/// Session-scoped credential material.
///
/// The password starts out empty unless supplied up front and is
/// populated at most once per run; every later host reuses it. There is
/// no other state shared across hosts.
pub struct Credential {
    /// Path to the private key used for the auth checks.
    pub private_key_path: PathBuf,

    /// Path to the public key that gets distributed.
    pub public_key_path: PathBuf,

    password: Option<SecretString>,
}

impl Credential {
    pub fn new(
        private_key_path: PathBuf,
        public_key_path: PathBuf,
        password: Option<String>,
    ) -> Self {
        Self {
            private_key_path,
            public_key_path,
            password: password.filter(|p| !p.is_empty()).map(SecretString::from),
        }
    }

    /// The cached password, prompting through `prompt` on first use.
    fn password(&mut self, prompt: &mut PasswordPrompt) -> Result<&SecretString> {
        if self.password.is_none() {
            let entered = prompt().map_err(Error::PasswordPrompt)?;
            self.password = Some(SecretString::from(entered));
        }

        // populated just above
        Ok(self.password.as_ref().unwrap())
    }
}

/// Masked terminal prompt, injected by the binary so the library (and
/// tests) never touch a terminal directly.
pub type PasswordPrompt = Box<dyn FnMut() -> io::Result<String> + Send>;

/// The SSH legwork behind the state machine, separated out so tests can
/// script every step's result.
pub trait KeyPipeline: Send {
    /// Short TCP dial; `false` means the host is skipped entirely.
    fn probe(&mut self, host: &str) -> impl Future<Output = bool> + Send;

    /// Public-key-only auth check. `Ok(true)` = works, `Ok(false)` =
    /// rejected, `Err` = transport failure.
    fn check_key_auth(
        &mut self,
        host: &str,
    ) -> impl Future<Output = std::result::Result<bool, TransportError>> + Send;

    /// Password-authenticated connect, script push and execution.
    fn install_key(
        &mut self,
        host: &str,
        password: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Key-authenticated connect, delete-script push and execution.
    fn remove_key(&mut self, host: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Sequences the pipeline per host and collects outcomes.
pub struct Distributor<P: KeyPipeline> {
    pipeline: P,
    credential: Credential,
    prompt: PasswordPrompt,
    port: u16,
}

impl<P: KeyPipeline> Distributor<P> {
    pub fn new(pipeline: P, credential: Credential, prompt: PasswordPrompt, port: u16) -> Self {
        Self {
            pipeline,
            credential,
            prompt,
            port,
        }
    }

    /// Run the pipeline over every host, strictly in order. One host's
    /// failure never aborts the loop.
    pub async fn run(&mut self, hosts: &[String], action: KeyAction) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(hosts.len());
        for host in hosts {
            let outcome = match action {
                KeyAction::Add => self.distribute(host).await,
                KeyAction::Delete => self.withdraw(host).await,
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// ADD state machine:
    /// `PROBE → AUTH_CHECK → PASSWORD_PROMPT → TRANSFER → RE_VERIFY`.
    pub async fn distribute(&mut self, host: &str) -> Outcome {
        info!("check: {}", host);

        if !self.pipeline.probe(host).await {
            return Outcome::failed(
                host,
                KeyAction::Add,
                format!("Port ({}) is not open", self.port),
            );
        }

        match self.pipeline.check_key_auth(host).await {
            // non-authentication failure short-circuits to a terminal
            // outcome carrying the error's message
            Err(e) => Outcome::failed(host, KeyAction::Add, e.to_string()),

            Ok(true) => Outcome::ok_with(host, KeyAction::Add, "has already been set up"),

            Ok(false) => {
                let password = match self.credential.password(&mut self.prompt) {
                    Ok(password) => password.expose_secret().to_string(),
                    Err(e) => return Outcome::failed(host, KeyAction::Add, e.to_string()),
                };

                if let Err(e) = self.pipeline.install_key(host, &password).await {
                    return Outcome::failed(host, KeyAction::Add, e.to_string());
                }

                // the script's exit status is not trusted; only the
                // re-verification decides
                let success = self.pipeline.check_key_auth(host).await.unwrap_or(false);
                Outcome {
                    host: host.to_string(),
                    success,
                    action: KeyAction::Add,
                    message: String::new(),
                }
            }
        }
    }

    /// DELETE variant: key-authenticated connect, push the filter
    /// script, succeed iff key login stops working.
    pub async fn withdraw(&mut self, host: &str) -> Outcome {
        info!("check: {}", host);

        if !self.pipeline.probe(host).await {
            return Outcome::failed(
                host,
                KeyAction::Delete,
                format!("Port ({}) is not open", self.port),
            );
        }

        if let Err(e) = self.pipeline.remove_key(host).await {
            return Outcome::failed(host, KeyAction::Delete, e.to_string());
        }

        // deleted means the key no longer authenticates; an error during
        // the re-check counts as no longer authenticating
        let still_works = self.pipeline.check_key_auth(host).await.unwrap_or(false);
        Outcome {
            host: host.to_string(),
            success: !still_works,
            action: KeyAction::Delete,
            message: String::new(),
        }
    }
}

/// The real pipeline: russh transport, sink-protocol transfer, remote
/// script execution.
pub struct SshPipeline {
    user: String,
    port: u16,
    opts: SshOptions,
    private_key_path: PathBuf,
    public_key_path: PathBuf,
}

impl SshPipeline {
    pub fn new(user: String, port: u16, opts: SshOptions, credential: &Credential) -> Self {
        Self {
            user,
            port,
            opts,
            private_key_path: credential.private_key_path.clone(),
            public_key_path: credential.public_key_path.clone(),
        }
    }

    fn target(&self, host: &str) -> ConnectionTarget {
        ConnectionTarget {
            host: host.to_string(),
            port: self.port,
            user: self.user.clone(),
        }
    }

    /// Push the script for `action` over an established connection and
    /// run it, stdout/stderr passed through for visibility. The script's
    /// own failure is logged, never fatal: correctness is judged by the
    /// re-verification.
    async fn push_and_run(&self, transport: &SshTransport, action: KeyAction) -> Result<()> {
        let public_key =
            std::fs::read_to_string(&self.public_key_path).map_err(|source| Error::Key(
                crate::error::KeyError::File {
                    path: self.public_key_path.clone(),
                    source,
                },
            ))?;

        let script = RemoteScript::for_action(action, &public_key, &self.user);
        let _staged = script
            .stage()
            .map_err(|source| crate::error::TransferError::Stage {
                path: script.local_path.clone(),
                source,
            })?;

        transfer::push_script(transport, &script).await?;

        match transport.execute(&format!("env sh {}", script.remote_path)).await {
            Ok(Some(0)) => {}
            Ok(status) => warn!("remote script exited with {:?}", status),
            Err(e) => warn!("remote script execution failed: {}", e),
        }

        Ok(())
    }
}

impl KeyPipeline for SshPipeline {
    async fn probe(&mut self, host: &str) -> bool {
        probe::probe(host, self.port, self.opts.probe_timeout).await
    }

    async fn check_key_auth(&mut self, host: &str) -> std::result::Result<bool, TransportError> {
        transport::check_key_auth(&self.target(host), &self.private_key_path, &self.opts).await
    }

    async fn install_key(&mut self, host: &str, password: &str) -> Result<()> {
        let auth = AuthMethod::Password(password.to_string());
        let transport = SshTransport::connect(&self.target(host), &auth, &self.opts).await?;

        let result = self.push_and_run(&transport, KeyAction::Add).await;

        if let Err(e) = transport.close().await {
            warn!("closing {}: {}", host, e);
        }
        result
    }

    async fn remove_key(&mut self, host: &str) -> Result<()> {
        let auth = AuthMethod::PrivateKey {
            path: self.private_key_path.clone(),
            passphrase: None,
        };
        let transport = SshTransport::connect(&self.target(host), &auth, &self.opts).await?;

        let result = self.push_and_run(&transport, KeyAction::Delete).await;

        if let Err(e) = transport.close().await {
            warn!("closing {}: {}", host, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted pipeline: pops one pre-recorded result per step call.
    #[derive(Default)]
    struct ScriptedPipeline {
        probe_results: VecDeque<bool>,
        auth_results: VecDeque<std::result::Result<bool, TransportError>>,
        install_results: VecDeque<Result<()>>,
        install_passwords: Vec<String>,
    }

    impl KeyPipeline for ScriptedPipeline {
        async fn probe(&mut self, _host: &str) -> bool {
            self.probe_results.pop_front().expect("unexpected probe")
        }

        async fn check_key_auth(
            &mut self,
            _host: &str,
        ) -> std::result::Result<bool, TransportError> {
            self.auth_results.pop_front().expect("unexpected auth check")
        }

        async fn install_key(&mut self, _host: &str, password: &str) -> Result<()> {
            self.install_passwords.push(password.to_string());
            self.install_results.pop_front().expect("unexpected install")
        }

        async fn remove_key(&mut self, _host: &str) -> Result<()> {
            self.install_results.pop_front().expect("unexpected remove")
        }
    }

    fn distributor(
        pipeline: ScriptedPipeline,
        password: Option<&str>,
    ) -> Distributor<ScriptedPipeline> {
        let credential = Credential::new(
            PathBuf::from("/nonexistent/id_ed25519"),
            PathBuf::from("/nonexistent/id_ed25519.pub"),
            password.map(String::from),
        );
        Distributor::new(
            pipeline,
            credential,
            Box::new(|| Ok("prompted-secret".to_string())),
            22,
        )
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_with_port_message() {
        let pipeline = ScriptedPipeline {
            probe_results: VecDeque::from([false]),
            ..Default::default()
        };
        let mut distributor = distributor(pipeline, None);

        let outcome = distributor.distribute("10.0.0.1").await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("Port (22)"));
    }

    #[tokio::test]
    async fn test_already_provisioned_host() {
        let pipeline = ScriptedPipeline {
            probe_results: VecDeque::from([true]),
            auth_results: VecDeque::from([Ok(true)]),
            ..Default::default()
        };
        let mut distributor = distributor(pipeline, None);

        let outcome = distributor.distribute("10.0.0.1").await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "has already been set up");
        assert_eq!(outcome.status(), "OK (ADD) - has already been set up");
    }

    #[tokio::test]
    async fn test_full_install_with_successful_reverify() {
        let pipeline = ScriptedPipeline {
            probe_results: VecDeque::from([true]),
            auth_results: VecDeque::from([Ok(false), Ok(true)]),
            install_results: VecDeque::from([Ok(())]),
            ..Default::default()
        };
        let mut distributor = distributor(pipeline, Some("hunter2"));

        let outcome = distributor.distribute("10.0.0.1").await;
        assert!(outcome.success);
        assert!(outcome.message.is_empty());
        assert_eq!(
            distributor.pipeline.install_passwords,
            vec!["hunter2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_reverify_fails_host() {
        let pipeline = ScriptedPipeline {
            probe_results: VecDeque::from([true]),
            auth_results: VecDeque::from([Ok(false), Ok(false)]),
            install_results: VecDeque::from([Ok(())]),
            ..Default::default()
        };
        let mut distributor = distributor(pipeline, Some("hunter2"));

        let outcome = distributor.distribute("10.0.0.1").await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_transport_error_short_circuits() {
        let pipeline = ScriptedPipeline {
            probe_results: VecDeque::from([true]),
            auth_results: VecDeque::from([Err(TransportError::Timeout(
                std::time::Duration::from_secs(1),
            ))]),
            ..Default::default()
        };
        let mut distributor = distributor(pipeline, None);

        let outcome = distributor.distribute("10.0.0.1").await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_password_prompted_once_and_cached() {
        let pipeline = ScriptedPipeline {
            probe_results: VecDeque::from([true, true]),
            auth_results: VecDeque::from([Ok(false), Ok(true), Ok(false), Ok(true)]),
            install_results: VecDeque::from([Ok(()), Ok(())]),
            ..Default::default()
        };

        let credential = Credential::new(
            PathBuf::from("/nonexistent/id_ed25519"),
            PathBuf::from("/nonexistent/id_ed25519.pub"),
            None,
        );
        let mut prompt_count = 0usize;
        // the closure owns the counter; assert through the recorded passwords
        let mut distributor = Distributor::new(
            pipeline,
            credential,
            Box::new(move || {
                prompt_count += 1;
                assert_eq!(prompt_count, 1, "password prompted more than once");
                Ok("first-and-only".to_string())
            }),
            22,
        );

        let outcomes = distributor
            .run(
                &["10.0.0.1".to_string(), "10.0.0.2".to_string()],
                KeyAction::Add,
            )
            .await;

        assert!(outcomes.iter().all(|o| o.success));
        assert_eq!(
            distributor.pipeline.install_passwords,
            vec!["first-and-only".to_string(), "first-and-only".to_string()]
        );
    }

    #[tokio::test]
    async fn test_withdraw_succeeds_when_key_stops_working() {
        let pipeline = ScriptedPipeline {
            probe_results: VecDeque::from([true]),
            auth_results: VecDeque::from([Ok(false)]),
            install_results: VecDeque::from([Ok(())]),
            ..Default::default()
        };
        let mut distributor = distributor(pipeline, None);

        let outcome = distributor.withdraw("10.0.0.1").await;
        assert!(outcome.success);
        assert_eq!(outcome.status(), "OK (DEL)");
    }

    #[tokio::test]
    async fn test_withdraw_fails_when_key_still_works() {
        let pipeline = ScriptedPipeline {
            probe_results: VecDeque::from([true]),
            auth_results: VecDeque::from([Ok(true)]),
            install_results: VecDeque::from([Ok(())]),
            ..Default::default()
        };
        let mut distributor = distributor(pipeline, None);

        let outcome = distributor.withdraw("10.0.0.1").await;
        assert!(!outcome.success);
    }

    #[test]
    fn test_overall_success_aggregation() {
        let mk = |success| Outcome {
            host: "h".to_string(),
            success,
            action: KeyAction::Add,
            message: String::new(),
        };

        assert!(overall_success(&[mk(false), mk(true), mk(false)]));
        assert!(!overall_success(&[mk(false), mk(false)]));
        assert!(!overall_success(&[]));
    }

    #[test]
    fn test_report_line_format() {
        let outcome = Outcome {
            host: "10.0.0.3".to_string(),
            success: false,
            action: KeyAction::Add,
            message: "Port (22) is not open".to_string(),
        };
        assert_eq!(
            outcome.report_line(),
            "10.0.0.3\t -> FAILED (ADD) - Port (22) is not open"
        );
    }
}
