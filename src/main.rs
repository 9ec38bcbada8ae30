//! Command-line front-end for keyseed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::error;

use keyseed::distribute::{Credential, Distributor, SshPipeline, overall_success};
use keyseed::resolver::resolve_hosts;
use keyseed::script::KeyAction;
use keyseed::transport::{HostKeyVerification, SshOptions};
use keyseed::{Error, keygen};

/// Distributes SSH public keys for key-based authentication.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Host ip (10.10.0.3) or pattern in conjunction with range (10.20.0.X)
    #[arg(short = 'i', long)]
    host: String,

    /// Port of ssh host
    #[arg(short = 'P', long, default_value_t = 22)]
    port: u16,

    /// User of ssh host
    #[arg(short, long, default_value = "root")]
    user: String,

    /// Ssh password (if you do not specify it you will be asked)
    #[arg(short, long)]
    password: Option<String>,

    /// Path of the private key [default: ~/.ssh/id_ed25519]
    #[arg(short = 'a', long)]
    private_key: Option<PathBuf>,

    /// Path of the public key [default: <private-key>.pub]
    #[arg(short = 'b', long)]
    public_key: Option<PathBuf>,

    /// Generate keys if missing, base path is the private key path
    #[arg(short = 'k', long)]
    generate_keys: bool,

    /// Range (1-6,8,13-233)
    #[arg(short, long)]
    range: Option<String>,

    /// Comma separated numbers excluded from the range
    #[arg(short, long)]
    exclude: Option<String>,

    /// Remove the key from the hosts instead of adding it
    #[arg(short, long)]
    delete: bool,

    /// Host key verification against known_hosts
    #[arg(long, value_enum, default_value_t = HostKeyCheck::Disabled)]
    host_key_check: HostKeyCheck,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum HostKeyCheck {
    /// Accept any host key (the historical default of this tool)
    Disabled,
    /// Learn unknown keys, reject changed ones
    AcceptNew,
    /// Reject unknown and changed keys
    Strict,
}

impl From<HostKeyCheck> for HostKeyVerification {
    fn from(check: HostKeyCheck) -> Self {
        match check {
            HostKeyCheck::Disabled => HostKeyVerification::Disabled,
            HostKeyCheck::AcceptNew => HostKeyVerification::AcceptNew,
            HostKeyCheck::Strict => HostKeyVerification::Strict,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool, Error> {
    let private_key = cli.private_key.unwrap_or_else(default_private_key);
    let public_key = cli
        .public_key
        .unwrap_or_else(|| with_pub_extension(&private_key));

    keygen::ensure_keypair(&private_key, &public_key, cli.generate_keys)?;

    let hosts = resolve_hosts(&cli.host, cli.range.as_deref(), cli.exclude.as_deref());
    if hosts.is_empty() {
        return Err(Error::NoHosts { pattern: cli.host });
    }

    let opts = SshOptions {
        host_key_verification: cli.host_key_check.into(),
        ..SshOptions::default()
    };

    let credential = Credential::new(private_key, public_key, cli.password);
    let pipeline = SshPipeline::new(cli.user, cli.port, opts, &credential);
    let prompt = Box::new(|| {
        dialoguer::Password::new()
            .with_prompt("Enter Password")
            .interact()
            .map_err(std::io::Error::other)
    });

    let mut distributor = Distributor::new(pipeline, credential, prompt, cli.port);

    let action = if cli.delete {
        KeyAction::Delete
    } else {
        KeyAction::Add
    };
    let outcomes = distributor.run(&hosts, action).await;

    for outcome in &outcomes {
        println!("{}", outcome.report_line());
    }

    Ok(overall_success(&outcomes))
}

fn default_private_key() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssh")
        .join("id_ed25519")
}

fn with_pub_extension(private_key: &std::path::Path) -> PathBuf {
    let mut name = private_key.as_os_str().to_os_string();
    name.push(".pub");
    PathBuf::from(name)
}
