//! Outreach CLI: upload media and submit gallery entries or attachments.
//!
//! Storage and persistence are configured through OUTREACH_* environment variables
//! (a `.env` file is honored). Without OUTREACH_PERSIST_URL the submission payload is
//! printed to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use outreach_cli::{
    build_persistence, display_name, load_files, parse_metadata, print_progress, MediaKind,
};
use outreach_core::telemetry::init_tracing;
use outreach_core::Config;
use outreach_storage::create_transport;
use outreach_upload::{
    PreviewRegistry, QueueConfig, SubmissionCoordinator, SubmissionError, SubmissionReceipt,
    UploadQueue,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "outreach", about = "Outreach media uploader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files and submit them together with metadata
    Submit {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Metadata JSON object, or @path to a file containing it
        #[arg(long)]
        metadata: String,
        /// Policy the files are checked against
        #[arg(long, value_enum, default_value = "gallery")]
        kind: MediaKind,
        /// Extra submission attempts when uploads or the save fail
        #[arg(long, default_value = "0")]
        retries: u32,
    },
    /// Check files against the upload policy without uploading
    Validate {
        /// Files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Policy the files are checked against
        #[arg(long, value_enum, default_value = "gallery")]
        kind: MediaKind,
    },
    /// Delete an uploaded object by public id
    Delete {
        /// Public id returned by a previous upload
        public_id: String,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Submit {
            files,
            metadata,
            kind,
            retries,
        } => {
            let metadata = parse_metadata(&metadata)?;
            let receipt = submit(&config, files, metadata, kind, retries).await?;
            print_json(&receipt)?;
        }
        Commands::Validate { files, kind } => {
            validate(&config, &files, kind).await?;
        }
        Commands::Delete { public_id } => {
            let transport = create_transport(&config)
                .await
                .context("Failed to create upload transport")?;
            transport
                .delete(&public_id)
                .await
                .with_context(|| format!("Failed to delete {}", public_id))?;
            println!("Deleted {}", public_id);
        }
    }

    Ok(())
}

async fn submit(
    config: &Config,
    paths: Vec<PathBuf>,
    metadata: Value,
    kind: MediaKind,
    retries: u32,
) -> anyhow::Result<SubmissionReceipt> {
    let transport = create_transport(config)
        .await
        .context("Failed to create upload transport")?;
    let persistence = build_persistence(config)?;

    let queue = UploadQueue::new(
        transport,
        Arc::new(PreviewRegistry::new()),
        QueueConfig {
            max_concurrent_uploads: config.max_concurrent_uploads,
            ..QueueConfig::new(kind.policy(config))
        },
    );

    let files = load_files(&paths).await?;
    let outcome = queue.add(files);
    for rejection in &outcome.rejected {
        eprintln!("Rejected {}: {}", rejection.filename, rejection.error);
    }
    if outcome.accepted.is_empty() {
        anyhow::bail!("None of the files can be uploaded");
    }

    let coordinator = SubmissionCoordinator::new(persistence);
    let mut attempt = 0;
    loop {
        let submission = coordinator.submit(&metadata, &queue);
        let progress = print_progress(&queue);
        tokio::pin!(submission, progress);

        let result = tokio::select! {
            result = &mut submission => result,
            _ = &mut progress => submission.await,
        };

        match result {
            Ok(receipt) => return Ok(receipt),
            Err(e @ (SubmissionError::Blocked { .. } | SubmissionError::Persistence(_)))
                if attempt < retries =>
            {
                attempt += 1;
                tracing::warn!(error = %e, attempt, "Submission failed; trying again");
            }
            Err(SubmissionError::Persistence(e)) => {
                for field_error in &e.errors {
                    match &field_error.field {
                        Some(field) => eprintln!("  {}: {}", field, field_error.message),
                        None => eprintln!("  {}", field_error.message),
                    }
                }
                return Err(SubmissionError::Persistence(e).into());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn validate(config: &Config, paths: &[PathBuf], kind: MediaKind) -> anyhow::Result<()> {
    let policy = kind.policy(config);
    let mut rejected = 0;

    for (index, path) in paths.iter().enumerate() {
        let name = display_name(path);
        let checked = match outreach_core::MediaFile::from_path(path).await {
            Ok(file) => policy
                .validate_count(index)
                .and_then(|_| policy.validate(&file))
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("cannot read file: {}", e)),
        };

        match checked {
            Ok(()) => println!("ok       {}", name),
            Err(reason) => {
                rejected += 1;
                println!("rejected {}: {}", name, reason);
            }
        }
    }

    if rejected > 0 {
        anyhow::bail!("{} of {} files rejected", rejected, paths.len());
    }
    Ok(())
}
