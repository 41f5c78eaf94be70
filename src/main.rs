use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use couplet::credentials::CredentialStore;
use couplet::keyexchange::DhParams;
use couplet::Server;

#[derive(Parser, Debug)]
#[command(name = "couplet")]
#[command(author, version, about = "Server-mediated pairwise chat relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay server
    Serve {
        #[arg(short, long, default_value = "0.0.0.0:5000")]
        bind: String,

        /// Path to the credential store (JSON username → password hash)
        #[arg(long, default_value = "user_db.json")]
        db: PathBuf,

        /// Hex-encoded DH prime; the default is a 64-bit development prime
        #[arg(long)]
        prime: Option<String>,

        /// DH generator
        #[arg(long, default_value = "2")]
        generator: u64,
    },
    /// Connect as an interactive chat client
    Connect {
        #[arg(default_value = "127.0.0.1:5000")]
        addr: String,

        /// Hex-encoded DH prime; must match the server's
        #[arg(long)]
        prime: Option<String>,

        /// DH generator; must match the server's
        #[arg(long, default_value = "2")]
        generator: u64,
    },
    /// Register a user in the credential store
    Register {
        username: String,

        #[arg(long, default_value = "user_db.json")]
        db: PathBuf,
    },
}

fn dh_params(prime: Option<String>, generator: u64) -> Result<DhParams> {
    match prime {
        Some(hex) => {
            DhParams::from_hex(&hex, generator).context("invalid DH parameters")
        }
        None => Ok(DhParams {
            generator: generator.into(),
            ..DhParams::default()
        }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            db,
            prime,
            generator,
        } => {
            let credentials = CredentialStore::load(&db)
                .with_context(|| format!("failed to load {}", db.display()))?;
            let params = dh_params(prime, generator)?;
            let server = Server::bind(&bind, credentials, params).await?;
            server.run().await
        }
        Commands::Connect {
            addr,
            prime,
            generator,
        } => {
            let params = dh_params(prime, generator)?;
            couplet::client::run(&addr, &params).await
        }
        Commands::Register { username, db } => {
            let mut store = CredentialStore::load(&db)
                .with_context(|| format!("failed to load {}", db.display()))?;
            let password = prompt_password()?;
            store.register(&username, &password)?;
            store.save(&db)?;
            println!("Usuário '{username}' registrado.");
            Ok(())
        }
    }
}

fn prompt_password() -> Result<String> {
    use std::io::Write;
    print!("Senha: ");
    std::io::stdout().flush()?;
    let mut password = String::new();
    std::io::stdin().read_line(&mut password)?;
    let password = password.trim();
    anyhow::ensure!(!password.is_empty(), "password must not be empty");
    Ok(password.to_string())
}
