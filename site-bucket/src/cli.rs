///
/// This module implements the full CLI interface for site-bucket: command parsing,
/// argument overrides, setup checks and the user-visible run.
///
/// All reconciliation logic (inventories, diffing, retries, deletion policy) lives in the
/// [`site-bucket-core`] crate. This module is strictly for CLI glue: it loads the
/// configuration, connects to S3, makes sure the bucket exists and hands over to the core.
///
/// ## How To Use
/// - For command-line users: use the installed `site-bucket` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`site-bucket-core`]: ../../site-bucket-core/
use crate::load_config::{load_config, write_template, CONFIGURATION_FILE};
use crate::s3::S3Store;
use crate::terminal::{PromptDecisions, StdoutSink};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use site_bucket_core::contract::StatusSink;
use site_bucket_core::deletion::DeletionDecision;
use site_bucket_core::synchronise::{ensure_bucket, synchronise};
use std::path::PathBuf;

/// CLI for site-bucket: publish a generated static site to S3.
#[derive(Parser)]
#[clap(
    name = "site-bucket",
    version,
    about = "Mirror a generated static site directory into an S3 bucket"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload new and changed files and offer to delete files removed locally
    Sync {
        /// Path to the YAML config file
        #[clap(long, default_value = CONFIGURATION_FILE)]
        config: PathBuf,
        /// Site directory to publish (overrides `site_dir` in the config)
        #[clap(long)]
        site_dir: Option<PathBuf>,
        /// How to treat remote files that no longer exist locally
        #[clap(long, value_enum)]
        delete_policy: Option<DeletePolicy>,
        /// Number of uploads to run at once
        #[clap(long)]
        concurrency: Option<usize>,
    },
    /// Write a template config file to fill in
    Init {
        /// Where to write the template
        #[clap(long, default_value = CONFIGURATION_FILE)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeletePolicy {
    /// Ask for every file until "delete all" or "keep all" is answered
    Prompt,
    DeleteAll,
    KeepAll,
}

impl From<DeletePolicy> for DeletionDecision {
    fn from(policy: DeletePolicy) -> Self {
        match policy {
            DeletePolicy::Prompt => DeletionDecision::Undecided,
            DeletePolicy::DeleteAll => DeletionDecision::DeleteAll,
            DeletePolicy::KeepAll => DeletionDecision::KeepAll,
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Init { config } => {
            let sink = StdoutSink;
            if write_template(&config)? {
                sink.line(&format!(
                    "Wrote {}. Fill in your S3 credentials and bucket, then run `site-bucket sync`.",
                    config.display()
                ));
            } else {
                sink.line(&format!("{} already exists; leaving it untouched.", config.display()));
            }
            Ok(())
        }
        Commands::Sync {
            config,
            site_dir,
            delete_policy,
            concurrency,
        } => {
            let mut config = load_config(config)?;
            if let Some(site_dir) = site_dir {
                config.sync.site_dir = site_dir;
            }
            if let Some(policy) = delete_policy {
                config.sync.delete_policy = policy.into();
            }
            if let Some(concurrency) = concurrency {
                anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");
                config.sync.upload_concurrency = concurrency;
            }
            config.sync.trace_loaded();

            if !config.sync.site_dir.is_dir() {
                tracing::error!(site_dir = %config.sync.site_dir.display(), "Site directory not found");
                anyhow::bail!(
                    "Site directory {} not found. Build your site first, or point --site-dir at it.",
                    config.sync.site_dir.display()
                );
            }

            tracing::info!(command = "sync", bucket = %config.bucket, "Starting synchronisation process");
            let store = S3Store::connect(&config);
            let sink = StdoutSink;
            ensure_bucket(&store, &sink)
                .await
                .with_context(|| format!("Could not prepare bucket {}", config.bucket))?;

            let decisions = PromptDecisions::stdin();
            match synchronise(&config.sync, &store, &decisions, &sink).await {
                Ok(report) => {
                    let failures = report.failure_count();
                    if failures > 0 {
                        tracing::warn!(command = "sync", failures, "Synchronisation finished with failed files");
                    } else {
                        tracing::info!(command = "sync", "Synchronisation complete");
                    }
                    sink.line(&format!(
                        "Done! Go visit: http://{}.s3.amazonaws.com/index.html",
                        config.bucket
                    ));
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
