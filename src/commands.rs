use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use haulbox::acquire::{AcquireError, AcquireSettings, Acquirer, DownloadRequest, PlaylistRequest};
use haulbox::auth::AuthRetryHandler;
use haulbox::clock::{Clock, SystemClock};
use haulbox::config::Config;
use haulbox::credentials::{CredentialManager, CredentialRegistry};
use haulbox::engine::YtDlpEngine;
use haulbox::jobs::{Job, JobManager, JobStore, MemoryStore};
use haulbox::ledger::FjallStore;
use haulbox::observability::Metrics;
use haulbox::storage::Storage;

use crate::cli::{BatchArgs, Cli, Commands, DownloadArgs, JobsArgs, PlaylistArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

struct Runtime {
    acquirer: Arc<Acquirer>,
    ledger: Option<FjallStore>,
    metrics: Arc<Metrics>,
}

impl Runtime {
    fn build(config: &Config) -> Result<Self, AnyError> {
        let metrics = Arc::new(Metrics::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let ledger = if config.ledger.ephemeral {
            None
        } else {
            Some(FjallStore::open(&config.ledger.path)?)
        };
        let store: Arc<dyn JobStore> = match &ledger {
            Some(ledger) => Arc::new(ledger.clone()),
            None => Arc::new(MemoryStore::new()),
        };
        let jobs = Arc::new(JobManager::open(store, clock.clone(), metrics.clone())?);

        let registry = CredentialRegistry::from_config(&config.credentials)?;
        let credentials = Arc::new(CredentialManager::new(
            registry,
            config.credentials.ttl.as_chrono(),
            clock,
            metrics.clone(),
        ));
        let auth = Arc::new(AuthRetryHandler::new(
            credentials,
            config.retry.max_auth_retries,
            metrics.clone(),
        ));

        let engine = Arc::new(
            YtDlpEngine::new(config.engine.binary.clone())
                .with_extra_args(config.engine.extra_args.clone()),
        );

        let acquirer = Acquirer::new(
            jobs,
            Storage::from_config(&config.storage),
            engine,
            auth,
            metrics.clone(),
            AcquireSettings::from_config(config),
        );

        Ok(Self {
            acquirer: Arc::new(acquirer),
            ledger,
            metrics,
        })
    }

    /// Drive `task` to completion. A shutdown signal aborts every active job, then
    /// waits for `task` so workspaces are still cleaned up.
    async fn until_done<T>(&self, task: impl Future<Output = T>) -> T {
        tokio::pin!(task);
        tokio::select! {
            out = &mut task => return out,
            _ = shutdown_signal() => {
                let aborted = self.acquirer.jobs().abort_active();
                warn!(jobs = aborted.len(), "Shutdown requested, aborting active jobs");
            }
        }
        task.await
    }

    fn close(&self) -> Result<(), AnyError> {
        if let Some(ledger) = &self.ledger {
            ledger.persist()?;
        }
        info!(metrics = ?self.metrics.snapshot(), "Finished");
        Ok(())
    }
}

pub async fn run(cli: Cli) -> Result<(), AnyError> {
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let runtime = Runtime::build(&config)?;

    let result = match cli.command {
        Commands::Download(args) => download(&runtime, args).await,
        Commands::Playlist(args) => playlist(&runtime, args).await,
        Commands::Batch(args) => batch(&runtime, args).await,
        Commands::Jobs(args) => jobs(&runtime, args),
        Commands::Config => Ok(()),
    };

    runtime.close()?;
    result
}

async fn download(runtime: &Runtime, args: DownloadArgs) -> Result<(), AnyError> {
    let request = DownloadRequest::builder()
        .url(args.url)
        .destination(args.output)
        .maybe_profile(args.profile)
        .maybe_file_name(args.name)
        .build();

    let result = runtime.until_done(runtime.acquirer.download(request)).await;
    report(runtime, result)
}

async fn playlist(runtime: &Runtime, args: PlaylistArgs) -> Result<(), AnyError> {
    let request = PlaylistRequest::builder()
        .url(args.url)
        .destination(args.output)
        .maybe_profile(args.profile)
        .maybe_max_items(args.max_items)
        .no_limit(args.no_max)
        .build();

    let result = runtime
        .until_done(runtime.acquirer.download_playlist(request))
        .await;
    report(runtime, result)
}

async fn batch(runtime: &Runtime, args: BatchArgs) -> Result<(), AnyError> {
    let requests = args
        .urls
        .into_iter()
        .map(|url| {
            DownloadRequest::builder()
                .url(url)
                .destination(args.output.clone())
                .maybe_profile(args.profile.clone())
                .build()
        })
        .collect();

    let results = runtime
        .until_done(runtime.acquirer.download_batch(requests))
        .await;

    let mut failed = 0;
    for result in results {
        match result {
            Ok(job) => println!("{}", serde_json::to_string(&job)?),
            Err(err) => {
                failed += 1;
                warn!(job_id = ?err.job_id(), error = %err, "Batch item failed");
                if let Some(job) = err.job_id().and_then(|id| runtime.acquirer.jobs().get(id).ok()) {
                    println!("{}", serde_json::to_string(&job)?);
                }
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} batch item(s) failed", failed).into());
    }
    Ok(())
}

fn jobs(runtime: &Runtime, args: JobsArgs) -> Result<(), AnyError> {
    let manager = runtime.acquirer.jobs();
    match args.id {
        Some(id) => {
            print_json(&manager.get(id)?)?;
            if args.events {
                for event in manager.events(id)? {
                    println!("{}", serde_json::to_string(&event)?);
                }
            }
        }
        None => {
            for job in manager.list() {
                println!("{}", serde_json::to_string(&job)?);
            }
        }
    }
    Ok(())
}

/// Print the job record whatever the outcome; a failed job is also the command's error
fn report(runtime: &Runtime, result: Result<Job, AcquireError>) -> Result<(), AnyError> {
    match result {
        Ok(job) => print_json(&job),
        Err(err) => {
            if let Some(job) = err.job_id().and_then(|id| runtime.acquirer.jobs().get(id).ok()) {
                print_json(&job)?;
            }
            Err(err.into())
        }
    }
}

fn print_json(job: &Job) -> Result<(), AnyError> {
    println!("{}", serde_json::to_string_pretty(job)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
