use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use vc_shield::config::VaultConfig;
use vc_shield::store::{FileStore, KeyValueStore};
use vc_shield::{CredentialDefinitionId, CredentialVault};

#[derive(Parser)]
#[command(name = "vc-shield")]
#[command(about = "Encrypted local cache for Verifiable Credentials")]
#[command(version)]
struct Cli {
    /// Path of the JSON store holding the key envelope and credentials
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Session passphrase (defaults to VC_SHIELD_PASSPHRASE)
    #[arg(long, global = true, env = "VC_SHIELD_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the shielding key if the store has none
    Init,
    /// Encrypt a credential payload and cache it
    Put {
        /// Credential definition id
        id: CredentialDefinitionId,
        /// File holding the payload, `-` for stdin
        file: PathBuf,
    },
    /// Decrypt a cached credential to stdout
    Get { id: CredentialDefinitionId },
    /// List cached credential definition ids
    List,
    /// Remove a cached credential
    Remove { id: CredentialDefinitionId },
    /// Re-encode the shielding key under a new passphrase
    Passwd {
        #[arg(long, env = "VC_SHIELD_NEW_PASSPHRASE", hide_env_values = true)]
        new_passphrase: String,
    },
    /// Show vault status
    Status,
}

async fn read_payload(file: &Path) -> Result<Vec<u8>> {
    if file.as_os_str() == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        return Ok(buf);
    }
    tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vc_shield=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = VaultConfig::from_env().context("loading configuration")?;
    if let Some(path) = cli.store {
        config.store_path = path;
    }
    if let Some(passphrase) = cli.passphrase {
        config.passphrase = Some(Zeroizing::new(passphrase));
    }
    let passphrase = config
        .passphrase
        .clone()
        .context("a passphrase is required (--passphrase or VC_SHIELD_PASSPHRASE)")?;

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.store_path.clone()));
    let vault = CredentialVault::open(store, &passphrase, config)
        .await
        .context("opening credential vault")?;

    match cli.command {
        Commands::Init => {
            if vault.key_created() {
                println!("shielding key created");
            } else {
                println!("shielding key already present");
            }
        }
        Commands::Put { id, file } => {
            let payload = Zeroizing::new(read_payload(&file).await?);
            let record = vault.store_credential(&id, &payload).await?;
            println!("{id}: {} bytes encrypted", record.ciphertext.len());
        }
        Commands::Get { id } => {
            let payload = Zeroizing::new(vault.load_credential(&id).await?);
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&payload).await?;
            stdout.flush().await?;
        }
        Commands::List => {
            for id in vault.list_credentials().await? {
                println!("{id}");
            }
        }
        Commands::Remove { id } => {
            if !vault.remove_credential(&id).await? {
                anyhow::bail!("no cached credential for {id}");
            }
        }
        Commands::Passwd { new_passphrase } => {
            let new_passphrase = Zeroizing::new(new_passphrase);
            vault.change_passphrase(&new_passphrase).await?;
            println!("passphrase changed");
        }
        Commands::Status => {
            let status = vault.status().await?;
            println!("store:        {}", status.store);
            println!("key created:  {}", status.key_created);
            if let Some(tx) = &status.created_by_tx {
                println!("created by:   {tx}");
            }
            if let Some(height) = status.created_at_height {
                println!("created at:   #{height}");
            }
            println!("credentials:  {}", status.credentials);
        }
    }

    Ok(())
}
