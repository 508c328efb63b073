use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use tormonol_core::client::TerminalClient;
use tormonol_core::config::Config;
use tormonol_core::core_keys::KeyStore;
use tormonol_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use tormonol_core::metrics::install_prometheus;
use tormonol_core::server::TormonolServer;
use tormonol_core::shutdown::{install_signal_handlers, ShutdownCoordinator};

mod interactive;
mod password;

#[derive(Parser, Debug)]
#[command(name = "tormonol")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file. TORMONOL_* environment variables apply on top.
    #[arg(short, long, global = true, env = "TORMONOL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the handshake endpoints and shell sessions
    Serve {
        /// Listen address, overriding `server.bind_address`
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Generate a password-protected signing key
    Keygen {
        /// Key directory (default: the platform config dir)
        #[arg(long)]
        key_dir: Option<PathBuf>,

        /// Replace an existing key
        #[arg(long)]
        force: bool,

        /// Also install the public key at `auth.authorized_key_path`
        #[arg(long)]
        authorize: bool,
    },
    /// Open a shell on a remote server
    Connect {
        /// Server root, e.g. http://127.0.0.1:3000
        url: String,

        /// Key directory (default: the platform config dir)
        #[arg(long)]
        key_dir: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    // Log lines would interleave with the remote shell in raw mode
    let default_level = match args.command {
        Command::Connect { .. } => Some("warn"),
        _ => None,
    };
    init_logging(&config, args.log_level.as_deref().or(default_level), args.json_logs)?;

    match args.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Keygen {
            key_dir,
            force,
            authorize,
        } => keygen(&config, key_dir, force, authorize),
        Command::Connect { url, key_dir } => {
            let code = connect(&url, key_dir).await?;
            // Tokio's stdin reader cannot be cancelled; exit without waiting for it
            std::process::exit(code)
        }
        Command::PrintConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let path = expand(path);
            Config::from_file(&path)
                .with_context(|| format!("loading config from {}", path.display()))?
        }
        None => Config::default(),
    };
    config.apply_env()?;
    config.auth.authorized_key_path = expand(&config.auth.authorized_key_path);
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &Config, level: Option<&str>, json: bool) -> Result<()> {
    let mut log_config = LogConfig::try_from(&config.logging)?;
    if let Some(level) = level {
        log_config.level = level.parse().unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', using 'info'", level);
            LogLevel::Info
        });
    }
    if json {
        log_config = log_config.json_format(true);
    }
    init_logging_with_config(log_config)?;
    Ok(())
}

/// Expand a leading `~` and environment variables.
fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => match shellexpand::full(raw) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(_) => path.to_path_buf(),
        },
        None => path.to_path_buf(),
    }
}

fn key_store(key_dir: Option<PathBuf>) -> KeyStore {
    match key_dir {
        Some(dir) => KeyStore::new(expand(&dir)),
        None => KeyStore::default_location(),
    }
}

async fn serve(mut config: Config, bind: Option<SocketAddr>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    if config.metrics.enabled {
        install_prometheus(config.metrics.bind_address)?;
    }

    let shutdown = Arc::new(ShutdownCoordinator::new(config.server.shutdown_timeout));
    install_signal_handlers(shutdown.clone());

    info!(
        shell = %config.shell.program,
        authorized_key = %config.auth.authorized_key_path.display(),
        "starting tormonol server"
    );
    TormonolServer::from_config(&config, shutdown)?.run().await
}

fn keygen(config: &Config, key_dir: Option<PathBuf>, force: bool, authorize: bool) -> Result<()> {
    let store = key_store(key_dir);
    if store.exists() && !force {
        bail!(
            "a key already exists in {} (use --force to replace it)",
            store.base_path().display()
        );
    }

    let password = password::new_password()?;
    let identity = store.generate(&password, force)?;
    println!("Private key: {}", store.private_path().display());
    println!("Public key:  {}", store.public_path().display());

    if authorize {
        let target = &config.auth.authorized_key_path;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let pem = identity.trust_anchor().to_spki_pem()?;
        std::fs::write(target, pem)
            .with_context(|| format!("writing {}", target.display()))?;
        println!("Authorized:  {}", target.display());
    }
    Ok(())
}

/// Returns the process exit code.
async fn connect(url: &str, key_dir: Option<PathBuf>) -> Result<i32> {
    let store = key_store(key_dir);
    if !store.exists() {
        bail!(
            "no key in {} (run `tormonol keygen` first)",
            store.base_path().display()
        );
    }

    let password = password::read_password("Key password: ")?;
    let identity = store.unlock(&password)?;
    let client = TerminalClient::new(url, identity)?;

    let reason = interactive::run(&client).await?;
    let code = interactive::exit_code(&reason);
    if code != 0 {
        warn!(code = reason.code(), reason = %reason.reason_text(), "session ended");
    }
    Ok(code)
}
