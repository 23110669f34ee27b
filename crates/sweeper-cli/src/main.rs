//! # sweeper
//!
//! Retention sweep for container registries.
//!
//! ## Modes
//!
//! - **Service Mode**: HTTP trigger at `/api/CleanupRegistry`, one sweep per request
//! - **CLI Mode**: a single sweep from the current environment
//! - **Demo Mode**: a sweep over a seeded in-memory registry
//!
//! ## Usage
//!
//! ```bash
//! # Serve the trigger (default port 7071)
//! sweeper serve --port 7071
//!
//! # One sweep, configuration from RegistryUrl / TenantId / ClientId / ClientSecret / RetentionDays
//! sweeper run
//!
//! # Classify only
//! sweeper run --dry-run --json
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

mod trigger;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sweeper_core::impls::InMemoryRegistry;
use sweeper_core::ports::{Clock, RegistryClient, SystemClock};
use sweeper_core::{
    ArtifactManifest, CancelHandle, CancelSignal, CleanupResult, RetentionCleanupJob,
    RetentionPolicy, SweepMode, SweepOptions, SweeperConfig,
};

use crate::trigger::{AcrConnector, RegistryConnector, TriggerState};

/// Registry retention sweeper.
#[derive(Debug, Parser)]
#[command(name = "sweeper")]
#[command(about = "Deletes registry artifacts older than a retention window")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the HTTP trigger.
    Serve {
        #[arg(long, env = "SWEEPER_PORT", default_value = "7071")]
        port: u16,
    },

    /// Run one sweep against the configured registry.
    Run {
        /// Classify without deleting (overrides SweepDryRun).
        #[arg(long)]
        dry_run: bool,

        /// Stop a repository at its first retained artifact (overrides SweepEarlyStop).
        #[arg(long)]
        early_stop: bool,

        /// Print the full result as JSON instead of the summary line.
        #[arg(long)]
        json: bool,
    },

    /// Sweep a seeded in-memory registry.
    Demo {
        #[arg(long, default_value = "30")]
        retention_days: u32,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .json()
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Serve { port } => {
            let (handle, cancel) = CancelSignal::channel();
            let state = Arc::new(TriggerState {
                env: Arc::new(|key: &str| std::env::var(key).ok()),
                connector: Arc::new(AcrConnector),
                clock: Arc::new(SystemClock),
                cancel,
            });
            let router = trigger::router(state);

            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            tracing::info!(address = %addr, "Starting cleanup trigger");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal(handle))
                .await?;
        }
        Commands::Run {
            dry_run,
            early_stop,
            json,
        } => {
            let config = SweeperConfig::from_env().context("loading configuration")?;
            let mut options = config.sweep_options();
            if dry_run {
                options.mode = SweepMode::DryRun;
            }
            options.early_stop |= early_stop;

            let client = AcrConnector.connect(&config);
            let result = sweep(
                SystemClock,
                options,
                &config.policy(),
                client.as_ref(),
            )
            .await?;
            report(&result, json)?;
        }
        Commands::Demo {
            retention_days,
            dry_run,
            json,
        } => {
            let clock = SystemClock;
            let registry = demo_registry(&clock);
            let options = if dry_run {
                SweepOptions::dry_run()
            } else {
                SweepOptions::default()
            };

            let result = sweep(
                clock,
                options,
                &RetentionPolicy::new(retention_days),
                &registry,
            )
            .await?;
            report(&result, json)?;
            if !dry_run {
                for repository in ["web", "worker"] {
                    tracing::info!(
                        repository,
                        remaining = ?registry.remaining_digests(repository),
                        "demo registry after sweep"
                    );
                }
            }
        }
    }

    Ok(())
}

/// `RUST_LOG` when set, otherwise `info`.
fn log_filter() -> EnvFilter {
    log_filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
}

fn log_filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// One sweep with Ctrl-C wired to cancellation.
async fn sweep<C: Clock>(
    clock: C,
    options: SweepOptions,
    policy: &RetentionPolicy,
    client: &dyn RegistryClient,
) -> Result<CleanupResult> {
    let (handle, cancel) = CancelSignal::channel();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current artifact");
            handle.cancel();
        }
    });

    let job = RetentionCleanupJob::new(clock, options);
    let outcome = job.run_until_cancelled(policy, client, &cancel).await;
    watcher.abort();

    outcome.map_err(|e| {
        let partial = e.partial();
        anyhow::anyhow!(
            "{e} after {} repositories (partial: Deleted: {} Safe: {})",
            partial.repositories_scanned,
            partial.deleted_images.len(),
            partial.ignored_images.len()
        )
    })
}

fn report(result: &CleanupResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    println!("{}", result.summary());
    for failure in &result.failed_deletions {
        println!(
            "  failed: {}@{} tag={} ({})",
            failure.repository,
            failure.digest,
            failure.tag.as_deref().unwrap_or("-"),
            failure.reason
        );
    }
    Ok(())
}

async fn shutdown_signal(handle: CancelHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested, cancelling in-flight sweeps");
    handle.cancel();
}

fn demo_registry(clock: &impl Clock) -> InMemoryRegistry {
    let now = clock.now();
    let days_ago = |days| now - Duration::days(days);
    InMemoryRegistry::new()
        .with_repository(
            "web",
            vec![
                ArtifactManifest::new("web", "sha256:0a1f", days_ago(2))
                    .with_tag("v3")
                    .with_tag("latest"),
                ArtifactManifest::new("web", "sha256:7c2e", days_ago(45)).with_tag("v2"),
                ArtifactManifest::new("web", "sha256:91bd", days_ago(120)).with_tag("v1"),
            ],
        )
        .with_repository(
            "worker",
            vec![
                ArtifactManifest::new("worker", "sha256:c4d0", days_ago(10)).with_tag("stable"),
                ArtifactManifest::new("worker", "sha256:e58a", days_ago(60)),
            ],
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sweeper_core::ports::FixedClock;

    #[test]
    fn parses_run_flags() {
        let args = Args::try_parse_from(["sweeper", "run", "--dry-run", "--json"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Run {
                dry_run: true,
                early_stop: false,
                json: true
            }
        ));
    }

    #[test]
    fn serve_port_defaults() {
        let args = Args::try_parse_from(["sweeper", "serve"]).unwrap();
        let Commands::Serve { port } = args.command else {
            panic!("expected serve");
        };
        // SWEEPER_PORT may be set in the environment running the tests
        if std::env::var("SWEEPER_PORT").is_err() {
            assert_eq!(port, 7071);
        }
    }

    #[test]
    fn log_filter_respects_explicit_directives() {
        use tracing::level_filters::LevelFilter;

        assert_eq!(
            log_filter_from(Some("warn")).max_level_hint(),
            Some(LevelFilter::WARN)
        );
        assert_eq!(log_filter_from(None).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[tokio::test]
    async fn demo_sweep_deletes_only_stale_artifacts() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let registry = demo_registry(&clock);

        let result = sweep(clock, SweepOptions::default(), &RetentionPolicy::new(30), &registry)
            .await
            .unwrap();

        assert_eq!(result.summary(), "Cleanup Complete - Deleted: 3 Safe: 2");
        assert_eq!(
            registry.remaining_digests("web"),
            vec!["sha256:0a1f".into()]
        );
        assert_eq!(
            registry.remaining_digests("worker"),
            vec!["sha256:c4d0".into()]
        );
    }
}
