// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use keypool::lease::{AcquireRequest, FinalState, Requester};
use keypool::stress::{self, StressPlan};
use keypool::{Catalog, LeaseManager, PoolConfig, PoolError, ServeConfig, WaitStatus};

/// Credential lease pool over a shared SQLite database.
#[derive(Debug, Parser)]
#[command(name = "keypool", version)]
struct Cli {
    #[command(flatten)]
    pool: PoolConfig,

    /// Log format (json or text).
    #[arg(long, env = "KEYPOOL_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "KEYPOOL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API with a background sweeper.
    Serve(ServeConfig),
    /// Validate and upsert a catalog.
    Seed {
        /// Catalog JSON file. Falls back to `KEY_POOL_JSON`.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Run one maintenance sweep.
    Sweep {
        /// Expire leases idle this long, instead of each lease's own TTL.
        #[arg(long)]
        stale_after_secs: Option<u64>,
    },
    /// Acquire a lease, optionally hold it, then release it.
    Acquire {
        #[arg(long)]
        provider: String,
        /// Defaults to a fresh UUID.
        #[arg(long)]
        request_id: Option<String>,
        #[arg(long, default_value = "")]
        user: String,
        #[arg(long, default_value = "")]
        session: String,
        #[arg(long, default_value = "")]
        tenant: String,
        #[arg(long, default_value_t = 1)]
        units: u32,
        /// Lease TTL in seconds; defaults to `--lease-ttl-secs`.
        #[arg(long)]
        ttl_secs: Option<u64>,
        /// Fail immediately instead of waiting.
        #[arg(long)]
        no_wait: bool,
        /// Hold the lease this long before releasing it.
        #[arg(long, default_value_t = 0)]
        hold_ms: u64,
        /// State to release into (released or error).
        #[arg(long, default_value = "released")]
        final_state: FinalState,
        /// Leave the lease active instead of releasing it.
        #[arg(long)]
        keep: bool,
    },
    /// Meter units against a credential's per-minute budget.
    Consume {
        #[arg(long)]
        credential_id: i64,
        #[arg(long, default_value_t = 1)]
        units: u32,
        /// Wait for budget instead of failing immediately.
        #[arg(long)]
        wait: bool,
    },
    /// Print queue depth and per-credential load for a provider.
    Status {
        #[arg(long)]
        provider: String,
    },
    /// Run concurrent acquire/hold/release workers and report latency.
    Stress {
        #[arg(long)]
        provider: String,
        #[arg(long, default_value_t = 16)]
        workers: usize,
        #[arg(long, default_value_t = 50)]
        hold_min_ms: u64,
        #[arg(long, default_value_t = 200)]
        hold_max_ms: u64,
        #[arg(long, default_value = "")]
        tenant: String,
    },
}

/// Lease as printed by `acquire`; the secret is masked.
#[derive(Debug, Serialize)]
struct AcquireOutput {
    lease_id: String,
    credential_id: i64,
    provider: String,
    key_name: String,
    request_id: String,
    secret: std::collections::BTreeMap<String, String>,
    acquired_at: chrono::DateTime<chrono::Utc>,
    released: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.pool.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => {}
        Err(e) => {
            error!("fatal: {e:#}");
            let retryable = e.downcast_ref::<PoolError>().is_some_and(PoolError::is_retryable);
            std::process::exit(if retryable { 3 } else { 1 });
        }
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr; stdout carries command output.
    match cli.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(serve) => {
            let shutdown = CancellationToken::new();
            spawn_signal_handler(shutdown.clone());
            keypool::run(cli.pool, serve, shutdown).await
        }
        Command::Seed { catalog } => {
            let catalog = match catalog {
                Some(path) => Catalog::load(&path)?,
                None => Catalog::from_env()?.ok_or_else(|| {
                    anyhow::anyhow!(
                        "no catalog: pass --catalog or set {}",
                        keypool::catalog::CATALOG_ENV
                    )
                })?,
            };
            let manager = LeaseManager::bootstrap(&cli.pool, None).await?;
            print_json(&manager.seed(&catalog).await?)
        }
        Command::Sweep { stale_after_secs } => {
            let manager = LeaseManager::bootstrap(&cli.pool, None).await?;
            let report = manager.sweep(stale_after_secs.map(Duration::from_secs)).await;
            print_json(&report)
        }
        Command::Acquire {
            provider,
            request_id,
            user,
            session,
            tenant,
            units,
            ttl_secs,
            no_wait,
            hold_ms,
            final_state,
            keep,
        } => {
            let manager = LeaseManager::bootstrap(&cli.pool, None).await?;
            let request_id = request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let mut req = AcquireRequest::new(provider, request_id)
                .requester(Requester::new(user, session, tenant))
                .units(units);
            if let Some(ttl) = ttl_secs {
                req = req.lease_ttl(Duration::from_secs(ttl));
            }
            let mut opts = cli.pool.wait_options();
            opts.wait = !no_wait;

            let on_wait = |status: &WaitStatus| {
                info!(state = status.code(), provider = status.provider(), "waiting");
            };
            let lease = manager.acquire(&req, &opts, Some(&on_wait)).await?;

            if hold_ms > 0 {
                tokio::time::sleep(Duration::from_millis(hold_ms)).await;
            }
            let released =
                if keep { false } else { manager.release(&lease.lease_id, final_state).await? };
            print_json(&AcquireOutput {
                lease_id: lease.lease_id,
                credential_id: lease.credential_id,
                provider: lease.provider,
                key_name: lease.key_name,
                request_id: lease.request_id,
                secret: lease.secret.redacted(),
                acquired_at: lease.acquired_at,
                released,
            })
        }
        Command::Consume { credential_id, units, wait } => {
            let manager = LeaseManager::bootstrap(&cli.pool, None).await?;
            let mut opts = cli.pool.wait_options();
            opts.wait = wait;
            manager.consume_units(credential_id, units, &opts, None).await?;
            print_json(&serde_json::json!({ "credential_id": credential_id, "consumed": units }))
        }
        Command::Status { provider } => {
            let manager = LeaseManager::bootstrap(&cli.pool, None).await?;
            print_json(&manager.provider_status(&provider).await?)
        }
        Command::Stress { provider, workers, hold_min_ms, hold_max_ms, tenant } => {
            let manager = LeaseManager::bootstrap(&cli.pool, None).await?;
            let plan = StressPlan {
                hold_min: Duration::from_millis(hold_min_ms),
                hold_max: Duration::from_millis(hold_max_ms),
                wait: cli.pool.wait_options(),
                tenant,
                ..StressPlan::new(provider, workers)
            };
            print_json(&stress::run(&manager, &plan).await)
        }
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await
                } else {
                    std::future::pending().await
                }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint {
                    s.recv().await
                } else {
                    std::future::pending().await
                }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
