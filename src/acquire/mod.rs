//! Single-item and playlist acquisition
//!
//! Every request becomes one job and follows the same path:
//!
//! 1. create the job (PENDING)
//! 2. probe the destination; an unwritable target fails the job before PROCESSING
//! 3. mark PROCESSING and create the job's local temp workspace
//! 4. run the engine through the auth retry handler with current cookies
//! 5. relocate every finished output to the destination under a sanitized name
//! 6. remove the workspace and mark the job terminal
//!
//! A failed relocation keeps the workspace so the output can be recovered by hand.

mod error;
mod workspace;

pub use error::AcquireError;
pub use workspace::{collect_outputs, final_name, group_items, is_output_name, OutputFile, OutputItem};

use bon::Builder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::auth::AuthRetryHandler;
use crate::config::Config;
use crate::engine::{DownloadEngine, EngineError, EngineFailureClass, EngineRequest, ItemLimit};
use crate::jobs::{Job, JobFailure, JobId, JobKind, JobManager, JobSpec};
use crate::observability::Metrics;
use crate::storage::{Storage, StorageAdapter, StorageError, StorageTarget};

/// Orchestration knobs taken from [`Config`]
#[derive(Debug, Clone)]
pub struct AcquireSettings {
    /// Per-file name template, e.g. `%(title)s [%(id)s].%(ext)s`
    pub output_template: String,
    /// Profile used when a request names none
    pub default_profile: Option<String>,
    pub playlist_max_items: Option<u32>,
    pub playlist_no_limit: bool,
    pub max_inflight_jobs: usize,
}

impl AcquireSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_template: config.engine.output_template.clone(),
            default_profile: config.credentials.default_profile.clone(),
            playlist_max_items: config.playlist.max_items,
            playlist_no_limit: config.playlist.no_limit,
            max_inflight_jobs: config.worker.max_inflight_jobs,
        }
    }

    fn playlist_default(&self) -> Option<u32> {
        if self.playlist_no_limit {
            None
        } else {
            self.playlist_max_items
        }
    }
}

impl Default for AcquireSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Builder)]
pub struct DownloadRequest {
    #[builder(into)]
    pub url: String,
    /// Directory the finished file is moved into
    #[builder(into)]
    pub destination: PathBuf,
    #[builder(into)]
    pub profile: Option<String>,
    /// Overrides the engine-chosen name of the main output file
    #[builder(into)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Builder)]
pub struct PlaylistRequest {
    #[builder(into)]
    pub url: String,
    #[builder(into)]
    pub destination: PathBuf,
    #[builder(into)]
    pub profile: Option<String>,
    /// Explicit item cap; `0` means unlimited and a positive cap beats `no_limit`
    pub max_items: Option<u32>,
    /// Ignore the configured default cap
    #[builder(default)]
    pub no_limit: bool,
}

struct Plan<'a> {
    kind: JobKind,
    url: &'a str,
    profile: Option<&'a str>,
    limit: ItemLimit,
    file_name: Option<&'a str>,
}

pub struct Acquirer {
    jobs: Arc<JobManager>,
    storage: Storage,
    engine: Arc<dyn DownloadEngine>,
    auth: Arc<AuthRetryHandler>,
    metrics: Arc<Metrics>,
    settings: AcquireSettings,
}

impl Acquirer {
    pub fn new(
        jobs: Arc<JobManager>,
        storage: Storage,
        engine: Arc<dyn DownloadEngine>,
        auth: Arc<AuthRetryHandler>,
        metrics: Arc<Metrics>,
        settings: AcquireSettings,
    ) -> Self {
        Self {
            jobs,
            storage,
            engine,
            auth,
            metrics,
            settings,
        }
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Acquire one item into `request.destination`
    pub async fn download(&self, request: DownloadRequest) -> Result<Job, AcquireError> {
        let job = self.jobs.create(JobSpec::new(
            JobKind::Single,
            &request.url,
            &request.destination,
        ))?;
        self.run_single(job.id, &request).await
    }

    /// Acquire every item of a playlist, bounded by the resolved item limit
    pub async fn download_playlist(&self, request: PlaylistRequest) -> Result<Job, AcquireError> {
        let limit = ItemLimit::resolve(
            request.max_items,
            request.no_limit,
            self.settings.playlist_default(),
        );
        let job = self.jobs.create(JobSpec::new(
            JobKind::Playlist,
            &request.url,
            &request.destination,
        ))?;
        info!(job_id = %job.id, limit = ?limit, "Playlist job queued");

        let plan = Plan {
            kind: JobKind::Playlist,
            url: &request.url,
            profile: request.profile.as_deref(),
            limit,
            file_name: None,
        };
        self.run(job.id, &request.destination, &plan).await
    }

    /// Run independent single-item downloads concurrently, at most
    /// `max_inflight_jobs` at a time. Results come back in request order.
    ///
    /// Every job is created up front, so queued work is visible (and abortable) before
    /// it starts.
    pub async fn download_batch(
        self: &Arc<Self>,
        requests: Vec<DownloadRequest>,
    ) -> Vec<Result<Job, AcquireError>> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_inflight_jobs.max(1)));
        let mut results: Vec<Option<Result<Job, AcquireError>>> =
            (0..requests.len()).map(|_| None).collect();
        let mut set = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let job = match self.jobs.create(JobSpec::new(
                JobKind::Single,
                &request.url,
                &request.destination,
            )) {
                Ok(job) => job,
                Err(e) => {
                    results[index] = Some(Err(e.into()));
                    continue;
                }
            };

            let acquirer = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, acquirer.run_single(job.id, &request).await)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!(error = %e, "Batch task failed"),
            }
        }

        results
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|| {
                    Err(AcquireError::Worker("task ended without a result".to_string()))
                })
            })
            .collect()
    }

    async fn run_single(&self, job_id: JobId, request: &DownloadRequest) -> Result<Job, AcquireError> {
        let plan = Plan {
            kind: JobKind::Single,
            url: &request.url,
            profile: request.profile.as_deref(),
            limit: ItemLimit::Unlimited,
            file_name: request.file_name.as_deref(),
        };
        self.run(job_id, &request.destination, &plan).await
    }

    async fn run(&self, job_id: JobId, destination: &Path, plan: &Plan<'_>) -> Result<Job, AcquireError> {
        let target = self.storage.resolve(destination);
        let adapter = self.storage.adapter(&target);

        if !adapter.can_write_to(&target.path).await {
            warn!(
                job_id = %job_id,
                target = %target.path.display(),
                remote = target.is_remote(),
                "Destination failed write probe"
            );
            return Err(self.fail(AcquireError::NotWritable {
                job_id,
                target: target.path.clone(),
            }));
        }

        if let Err(e) = self.jobs.mark_processing(job_id) {
            return Err(self.fail(e.into()));
        }
        let cancel = self.jobs.cancellation_token(job_id)?;

        let workspaces = self.storage.workspace_adapter();
        let workspace = match workspaces.get_temp_processing_dir(job_id).await {
            Ok(path) => path,
            Err(source) => {
                return Err(self.fail(AcquireError::Workspace {
                    job_id,
                    path: workspaces.temp_root().join(job_id.to_string()),
                    source,
                }));
            }
        };

        let result = self
            .acquire_into(job_id, &workspace, &target, adapter.as_ref(), plan, &cancel)
            .await;

        if matches!(result, Err(AcquireError::MoveFailure { .. })) {
            warn!(
                job_id = %job_id,
                workspace = %workspace.display(),
                "Keeping temp workspace for manual recovery"
            );
        } else {
            workspaces.cleanup_temp_dir(&workspace).await;
        }

        match result {
            Ok(output_path) => self
                .jobs
                .mark_completed(job_id, &output_path)
                .map_err(|e| self.fail(e.into())),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Everything between PROCESSING and the terminal transition. Returns the path
    /// recorded as the job's output.
    async fn acquire_into(
        &self,
        job_id: JobId,
        workspace: &Path,
        target: &StorageTarget,
        adapter: &dyn StorageAdapter,
        plan: &Plan<'_>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, AcquireError> {
        let profile = plan.profile.or(self.settings.default_profile.as_deref());
        let output_template = EngineRequest::template_in(workspace, &self.settings.output_template);

        info!(
            job_id = %job_id,
            url = plan.url,
            engine = self.engine.name(),
            profile,
            "Invoking engine"
        );

        self.auth
            .execute(profile, |credential| {
                let request = EngineRequest {
                    url: plan.url.to_string(),
                    workspace: workspace.to_path_buf(),
                    output_template: output_template.clone(),
                    restrict_filenames: true,
                    playlist: plan.kind == JobKind::Playlist,
                    limit: plan.limit,
                    cookies: credential.map(|c| c.payload),
                };
                let engine = Arc::clone(&self.engine);
                let cancel = cancel.clone();
                async move { engine.fetch(&request, &cancel).await }
            })
            .await
            .map_err(|e| AcquireError::from_retry(job_id, profile, e))?;

        if cancel.is_cancelled() {
            return Err(AcquireError::Aborted { job_id });
        }

        let outputs = collect_outputs(workspace)
            .await
            .map_err(|source| AcquireError::Workspace {
                job_id,
                path: workspace.to_path_buf(),
                source: StorageError::Io {
                    path: workspace.to_path_buf(),
                    source,
                },
            })?;

        if outputs.is_empty() {
            return Err(AcquireError::EngineFailure {
                job_id,
                class: EngineFailureClass::NoOutput,
                source: EngineError::no_output(workspace),
            });
        }

        match plan.kind {
            JobKind::Playlist => {
                let mut items = group_items(outputs);
                let keep = plan.limit.take(items.len());
                if keep < items.len() {
                    warn!(
                        job_id = %job_id,
                        produced = items.len(),
                        keep,
                        "Engine produced more items than allowed, discarding the rest"
                    );
                    items.truncate(keep);
                }

                for item in &items {
                    if cancel.is_cancelled() {
                        return Err(AcquireError::Aborted { job_id });
                    }
                    for file in item.files() {
                        self.relocate(job_id, file, target, adapter, None).await?;
                    }
                    self.jobs.record_item(job_id)?;
                }
                info!(job_id = %job_id, items = items.len(), "Playlist relocated");
                Ok(target.path.clone())
            }
            JobKind::Single => {
                // the largest file is the media; the rest are sidecars
                let primary = outputs
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, o)| o.size)
                    .map(|(i, _)| i)
                    .unwrap_or(0);

                let mut output_path = target.path.clone();
                for (i, output) in outputs.iter().enumerate() {
                    let requested = if i == primary { plan.file_name } else { None };
                    let moved = self.relocate(job_id, output, target, adapter, requested).await?;
                    if i == primary {
                        output_path = moved;
                    }
                }
                self.jobs.record_item(job_id)?;
                Ok(output_path)
            }
        }
    }

    async fn relocate(
        &self,
        job_id: JobId,
        output: &OutputFile,
        target: &StorageTarget,
        adapter: &dyn StorageAdapter,
        requested: Option<&str>,
    ) -> Result<PathBuf, AcquireError> {
        let destination = target.path.join(final_name(output, requested));
        let moved = adapter
            .move_file(&output.path, &destination)
            .await
            .map_err(|source| AcquireError::MoveFailure {
                job_id,
                temp_path: output.path.clone(),
                destination: destination.clone(),
                source,
            })?;
        self.metrics.file_moved(target.is_remote());
        Ok(moved)
    }

    /// Record `err` on its job unless the job already reached a terminal state. A job
    /// aborted underneath us reports `Aborted` whatever the in-flight error was.
    fn fail(&self, err: AcquireError) -> AcquireError {
        let Some(job_id) = err.job_id() else {
            return err;
        };

        if let Ok(job) = self.jobs.get(job_id) {
            if job.is_terminal() {
                return match job.error {
                    Some(JobFailure::Aborted) => AcquireError::Aborted { job_id },
                    _ => err,
                };
            }
        }

        if let Some(failure) = err.failure() {
            if let Err(e) = self.jobs.mark_failed(job_id, failure) {
                error!(job_id = %job_id, error = %e, "Failed to record job failure");
            }
        }
        err
    }
}
