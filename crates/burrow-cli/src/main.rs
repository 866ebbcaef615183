//! burrow CLI
//!
//! Key management and configuration checking for the burrow tunnel
//! daemon. The daemon itself wires a socket and a TUN/TAP device into
//! `burrow_core::Context`; this binary covers everything that runs before
//! that loop starts.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use burrow_core::config::{parse_secret_file, Config};
use burrow_core::protocol::IdentityKeys;

/// burrow - authenticated point-to-point tunnel daemon
#[derive(Parser)]
#[command(name = "burrow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a long-term identity key pair
    GenerateKey,

    /// Print the public key for a secret key file
    ShowKey {
        /// Path to the secret key file
        #[arg(required = true)]
        key_file: PathBuf,
    },

    /// Parse and validate a configuration file
    CheckConfig {
        /// Path to the configuration file
        #[arg(required = true)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::GenerateKey => generate_key(),
        Commands::ShowKey { key_file } => show_key(&key_file),
        Commands::CheckConfig { config } => check_config(&config),
    }
}

/// Read 32 bytes from the blocking CSPRNG source and print the pair.
fn generate_key() -> anyhow::Result<()> {
    eprintln!("Reading 32 bytes from the blocking random source...");
    let identity = IdentityKeys::generate()?;
    println!("Secret: {}", identity.secret.to_hex());
    println!("Public: {}", identity.public.to_hex());
    Ok(())
}

fn show_key(key_file: &PathBuf) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(key_file)?;
    let secret = parse_secret_file(&contents)?;
    let identity = IdentityKeys::from_secret_hex(&secret)?;
    println!("Public: {}", identity.public.to_hex());
    Ok(())
}

fn check_config(path: &PathBuf) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;

    if config.secret.is_none() {
        anyhow::bail!("no secret key configured");
    }
    let identity = IdentityKeys::from_secret_hex(
        config.secret.as_deref().unwrap_or_default(),
    )?;

    let mut enabled = 0usize;
    for peer in &config.peers {
        match peer.key.as_deref() {
            None => {
                println!("peer `{}`: disabled (no key)", peer.name);
            }
            Some(hex) => match burrow_crypto::ec25519::PublicKey::from_hex(hex) {
                Err(_) => println!("peer `{}`: disabled (invalid key)", peer.name),
                Ok(key) if key == identity.public => {
                    println!("peer `{}`: disabled (own key)", peer.name);
                }
                Ok(_) => {
                    enabled += 1;
                }
            },
        }
    }

    println!(
        "configuration ok: method `{}`, {} of {} peers enabled",
        config.method,
        enabled,
        config.peers.len()
    );
    Ok(())
}
