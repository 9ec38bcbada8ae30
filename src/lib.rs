//! # Keyseed
//!
//! Distributes SSH public keys to fleets of hosts so that key-based
//! authentication works everywhere afterwards.
//!
//! For every resolved target the pipeline probes the SSH port, checks
//! whether public-key login already works, falls back to a (once-per-run)
//! password, uploads an idempotent provisioning script through an inline
//! SCP-style sink protocol, runs it, and re-verifies key login. A
//! symmetric DELETE variant removes the key again.
//!
//! Host key verification is **disabled by default**: the tool targets
//! freshly imaged machines on an operator-controlled network. Pass a
//! stricter [`transport::HostKeyVerification`] mode when that trade-off
//! is not acceptable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use keyseed::distribute::{Credential, Distributor, PasswordPrompt, SshPipeline, overall_success};
//! use keyseed::resolver::resolve_hosts;
//! use keyseed::script::KeyAction;
//! use keyseed::transport::SshOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keyseed::Error> {
//!     let hosts = resolve_hosts("10.0.0.X", Some("1-3"), None);
//!
//!     let credential = Credential::new(
//!         PathBuf::from("/home/me/.ssh/id_ed25519"),
//!         PathBuf::from("/home/me/.ssh/id_ed25519.pub"),
//!         None,
//!     );
//!     let pipeline = SshPipeline::new("root".into(), 22, SshOptions::default(), &credential);
//!     let prompt: PasswordPrompt = Box::new(|| Ok("secret".to_string()));
//!
//!     let mut distributor = Distributor::new(pipeline, credential, prompt, 22);
//!     let outcomes = distributor.run(&hosts, KeyAction::Add).await;
//!
//!     for outcome in &outcomes {
//!         println!("{}", outcome.report_line());
//!     }
//!     assert!(overall_success(&outcomes));
//!     Ok(())
//! }
//! ```

pub mod distribute;
pub mod error;
pub mod keygen;
pub mod probe;
pub mod resolver;
pub mod script;
pub mod transfer;
pub mod transport;

// Re-export main types for convenience
pub use distribute::{Credential, Distributor, KeyPipeline, Outcome, SshPipeline, overall_success};
pub use error::Error;
pub use script::{KeyAction, RemoteScript};
pub use transport::{AuthMethod, ConnectionTarget, HostKeyVerification, SshOptions};
