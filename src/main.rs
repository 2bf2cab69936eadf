//! `synclinear` - command line front end for the sync core
//!
//! Usage:
//!   synclinear serve                      Run the save endpoint
//!   synclinear encrypt <secret>           Encrypt an API key with ENCRYPTION_KEY
//!   synclinear decrypt <ciphertext> <iv>  Decrypt a stored API key
//!   synclinear save ...                   Submit a Linear/GitHub pair
//!   synclinear attachment-query ...       Print the attachmentCreate mutation
//!   synclinear skip-reason ...            Print a loop guard audit line

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use synclinear::context::{GitHubContext, LinearContext};
use synclinear::crypto::{self, EncryptionKey};
use synclinear::guard::{LoopGuard, SyncEventKind};
use synclinear::integrations::build_attachment_mutation;
use synclinear::orchestrator::SyncOrchestrator;
use synclinear::server::{self, AppState};
use synclinear::{format_json, SyncConfig};

#[derive(Parser)]
#[command(name = "synclinear", version, about = "Linear <-> GitHub sync core")]
struct Cli {
    /// Base URL of the save endpoint
    #[arg(long, env = "SYNC_API_URL", global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the save endpoint
    Serve {
        #[arg(long, env = "SYNC_PORT")]
        port: Option<u16>,
    },
    /// Encrypt a secret with ENCRYPTION_KEY
    Encrypt { plaintext: String },
    /// Decrypt a hex ciphertext and IV with ENCRYPTION_KEY
    Decrypt {
        ciphertext: String,
        init_vector: String,
    },
    /// Submit a Linear/GitHub pair to the save endpoint
    Save {
        #[arg(long, default_value = "")]
        linear_user: String,
        #[arg(long)]
        linear_team: String,
        #[arg(long, env = "LINEAR_API_KEY", hide_env_values = true)]
        linear_key: String,
        #[arg(long, default_value = "")]
        github_user: String,
        #[arg(long)]
        github_repo: String,
        #[arg(long, env = "GITHUB_API_KEY", hide_env_values = true)]
        github_key: String,
    },
    /// Print the attachmentCreate mutation for a mirrored issue
    AttachmentQuery {
        issue_id: String,
        issue_number: u64,
        /// owner/name
        repo_full_name: String,
    },
    /// Print the loop guard audit line for an event
    SkipReason {
        /// issue, edit, comment, state-change, label or assignee
        kind: SyncEventKind,
        issue_number: String,
        #[arg(long)]
        caused_by_sync: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,synclinear=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = SyncConfig::from_env();
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url.trim_end_matches('/').to_string();
    }

    match cli.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(config.port);
            let key =
                EncryptionKey::from_env().context("the save endpoint needs ENCRYPTION_KEY")?;
            let app = server::router(Arc::new(AppState::new(key)));

            let addr = format!("0.0.0.0:{port}");
            info!("Save endpoint listening on {}", addr);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            axum::serve(listener, app).await?;
        }
        Command::Encrypt { plaintext } => {
            let key = EncryptionKey::from_env()?;
            let secret = crypto::encrypt(&plaintext, &key)?;
            println!("{}", format_json(&secret));
        }
        Command::Decrypt {
            ciphertext,
            init_vector,
        } => {
            let key = EncryptionKey::from_env()?;
            println!("{}", crypto::decrypt(&ciphertext, &init_vector, &key)?);
        }
        Command::Save {
            linear_user,
            linear_team,
            linear_key,
            github_user,
            github_repo,
            github_key,
        } => {
            let orchestrator = SyncOrchestrator::new(&config)?;
            let linear = LinearContext {
                user_id: linear_user,
                team_id: linear_team,
                api_key: linear_key,
            };
            let github = GitHubContext {
                user_id: github_user,
                repo_id: github_repo,
                api_key: github_key,
            };

            let receipt = orchestrator
                .save(linear, github)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!(
                "Synced! Linear team {} <-> GitHub repo {} at {}",
                receipt.linear_team_id, receipt.github_repo_id, receipt.saved_at
            );
        }
        Command::AttachmentQuery {
            issue_id,
            issue_number,
            repo_full_name,
        } => {
            println!(
                "{}",
                build_attachment_mutation(&issue_id, issue_number, &repo_full_name)
            );
        }
        Command::SkipReason {
            kind,
            issue_number,
            caused_by_sync,
        } => {
            println!("{}", LoopGuard::describe(kind, issue_number, caused_by_sync));
        }
    }

    Ok(())
}
