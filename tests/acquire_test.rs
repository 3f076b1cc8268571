use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use haulbox::acquire::{AcquireError, AcquireSettings, Acquirer, DownloadRequest, PlaylistRequest};
use haulbox::auth::AuthRetryHandler;
use haulbox::clock::SystemClock;
use haulbox::credentials::{
    CookiePayload, CredentialError, CredentialManager, CredentialRegistry, CredentialSource,
};
use haulbox::engine::{DownloadEngine, EngineError, EngineFailureClass, EngineRequest};
use haulbox::jobs::{JobFailure, JobManager, JobStatus, MemoryStore};
use haulbox::observability::Metrics;
use haulbox::storage::Storage;

const NAS_INDICATOR: &str = "simulated-nas";

/// What the fake engine does on its next invocation
enum Step {
    /// Write these `(name, size)` files; `{slug}` is replaced by the URL's last segment
    Write(Vec<(String, usize)>),
    /// Write whole items (media plus sidecars); `honor_limit` applies the item bound
    Items {
        items: Vec<Vec<(String, usize)>>,
        honor_limit: bool,
    },
    Fail(EngineError),
    /// Block until the job is cancelled
    Hang,
}

struct FakeEngine {
    steps: Mutex<VecDeque<Step>>,
    /// Used once the script runs out
    fallback: Vec<(String, usize)>,
    calls: AtomicU32,
    cookies: Mutex<Vec<Option<CookiePayload>>>,
}

impl FakeEngine {
    fn scripted(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback: vec![("{slug} [id].mp4".to_string(), 256)],
            calls: AtomicU32::new(0),
            cookies: Mutex::new(Vec::new()),
        }
    }

    fn writing(files: Vec<(&str, usize)>) -> Self {
        Self::scripted(vec![Step::Write(
            files.into_iter().map(|(n, s)| (n.to_string(), s)).collect(),
        )])
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownloadEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch(
        &self,
        request: &EngineRequest,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cookies.lock().unwrap().push(request.cookies.clone());

        let step = self.steps.lock().unwrap().pop_front();
        let files = match step {
            Some(Step::Write(files)) => files,
            Some(Step::Items { items, honor_limit }) => {
                let count = if honor_limit {
                    request.limit.take(items.len())
                } else {
                    items.len()
                };
                for (name, size) in items.into_iter().take(count).flatten() {
                    tokio::fs::write(request.workspace.join(&name), vec![7u8; size])
                        .await
                        .unwrap();
                }
                return Ok(());
            }
            Some(Step::Fail(err)) => return Err(err),
            Some(Step::Hang) => {
                cancel.cancelled().await;
                return Err(EngineError::cancelled());
            }
            None => self.fallback.clone(),
        };

        let slug = request.url.rsplit('/').next().unwrap_or("item");
        let count = if request.playlist {
            request.limit.take(files.len())
        } else {
            files.len()
        };

        for (name, size) in files.iter().take(count) {
            let name = name.replace("{slug}", slug);
            tokio::fs::write(request.workspace.join(&name), vec![7u8; *size])
                .await
                .unwrap();
        }
        // leftover fragment from an interrupted retry inside the engine
        tokio::fs::write(request.workspace.join("fragment.mp4.part"), b"partial")
            .await
            .unwrap();
        Ok(())
    }
}

struct CountingSource {
    extractions: AtomicU32,
}

#[async_trait]
impl CredentialSource for CountingSource {
    fn describe(&self) -> String {
        "counting".to_string()
    }

    async fn extract(&self, _profile: &str) -> Result<CookiePayload, CredentialError> {
        let n = self.extractions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CookiePayload::Netscape(format!("# cookie jar {}\n", n)))
    }
}

struct Harness {
    acquirer: Arc<Acquirer>,
    engine: Arc<FakeEngine>,
    source: Arc<CountingSource>,
    metrics: Arc<Metrics>,
    root: TempDir,
}

impl Harness {
    fn new(engine: FakeEngine) -> Self {
        Self::with_settings(engine, AcquireSettings::default())
    }

    fn with_settings(engine: FakeEngine, settings: AcquireSettings) -> Self {
        let root = TempDir::new().unwrap();
        let metrics = Arc::new(Metrics::new());
        let clock = Arc::new(SystemClock);

        let jobs = Arc::new(JobManager::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            metrics.clone(),
        ));

        let source = Arc::new(CountingSource {
            extractions: AtomicU32::new(0),
        });
        let mut registry = CredentialRegistry::new();
        registry.register("member", source.clone());
        let credentials = Arc::new(CredentialManager::new(
            registry,
            chrono::Duration::minutes(30),
            clock,
            metrics.clone(),
        ));
        let auth = Arc::new(AuthRetryHandler::new(credentials, 2, metrics.clone()));

        let storage = Storage::new(root.path().join("work"), vec![NAS_INDICATOR.to_string()]);
        let engine = Arc::new(engine);

        let acquirer = Acquirer::new(
            jobs,
            storage,
            engine.clone(),
            auth,
            metrics.clone(),
            settings,
        );

        Self {
            acquirer: Arc::new(acquirer),
            engine,
            source,
            metrics,
            root,
        }
    }

    fn library(&self) -> PathBuf {
        self.root.path().join("library")
    }

    fn nas(&self) -> PathBuf {
        self.root.path().join(NAS_INDICATOR).join("shows")
    }

    fn workspace_root(&self) -> PathBuf {
        self.root.path().join("work")
    }

    fn extractions(&self) -> u32 {
        self.source.extractions.load(Ordering::SeqCst)
    }
}

fn download(url: &str, destination: &Path) -> DownloadRequest {
    DownloadRequest::builder()
        .url(url)
        .destination(destination)
        .build()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn workspace_count(root: &Path) -> usize {
    match std::fs::read_dir(root) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

fn auth_failure() -> EngineError {
    EngineError::new("HTTP Error 403: Forbidden").with_http_status(403)
}

fn playlist_items(n: usize) -> Vec<(String, usize)> {
    (1..=n)
        .map(|i| (format!("Episode {:02} [ep{}].mp4", i, i), 100 + i))
        .collect()
}

#[tokio::test]
async fn test_single_download_to_local_target_completes() {
    let h = Harness::new(FakeEngine::writing(vec![
        ("Sample Clip [abc].mp4", 4096),
        ("Sample Clip [abc].en.vtt", 128),
    ]));

    let job = h
        .acquirer
        .download(download("https://example.com/watch/abc", &h.library()))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.started_at.is_some());
    assert!(job.duration_seconds.unwrap() >= 0.0);
    assert_eq!(job.items_completed, 1);
    assert!(job.error.is_none());

    let output = job.output_path.unwrap();
    assert!(output.ends_with("library/Sample Clip [abc].mp4"));
    assert_eq!(std::fs::metadata(&output).unwrap().len(), 4096);
    assert_eq!(
        files_in(&h.library()),
        vec!["Sample Clip [abc].en.vtt", "Sample Clip [abc].mp4"]
    );

    assert_eq!(workspace_count(&h.workspace_root()), 0);
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.jobs_completed, 1);
    assert_eq!(snapshot.local_moves, 2);
    assert_eq!(snapshot.remote_moves, 0);
}

#[tokio::test]
async fn test_requested_file_name_applies_to_primary_output() {
    let h = Harness::new(FakeEngine::writing(vec![
        ("raw title [abc].webm", 2048),
        ("raw title [abc].info.json", 16),
    ]));

    let request = DownloadRequest::builder()
        .url("https://example.com/watch/abc")
        .destination(h.library())
        .file_name("Concert: Night #2")
        .build();
    let job = h.acquirer.download(request).await.unwrap();

    assert!(job.output_path.unwrap().ends_with("Concert_ Night _2.webm"));
    assert!(files_in(&h.library()).contains(&"raw title [abc].info.json".to_string()));
}

#[tokio::test]
async fn test_unwritable_remote_target_fails_before_processing() {
    let h = Harness::new(FakeEngine::writing(vec![("clip.mp4", 64)]));

    // a regular file where the share's directory should be
    let blocker = h.root.path().join(NAS_INDICATOR);
    std::fs::write(&blocker, b"not a directory").unwrap();
    let destination = blocker.join("shows");

    let err = h
        .acquirer
        .download(download("https://example.com/watch/abc", &destination))
        .await
        .unwrap_err();

    assert!(matches!(err, AcquireError::NotWritable { .. }));
    assert!(!err.retryable());

    let job = h.acquirer.jobs().get(err.job_id().unwrap()).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.started_at.is_none());
    assert!(matches!(job.error, Some(JobFailure::NotWritable { .. })));

    assert_eq!(h.engine.calls(), 0);
    assert_eq!(workspace_count(&h.workspace_root()), 0);
}

#[tokio::test]
async fn test_playlist_without_limit_downloads_every_item() {
    let h = Harness::new(FakeEngine::scripted(vec![Step::Write(playlist_items(8))]));

    let request = PlaylistRequest::builder()
        .url("https://example.com/playlist/season-1")
        .destination(h.library())
        .build();
    let job = h.acquirer.download_playlist(request).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.items_completed, 8);
    assert_eq!(files_in(&h.library()).len(), 8);
}

#[tokio::test]
async fn test_playlist_max_items_caps_downloads() {
    let h = Harness::new(FakeEngine::scripted(vec![Step::Write(playlist_items(8))]));

    let request = PlaylistRequest::builder()
        .url("https://example.com/playlist/season-1")
        .destination(h.library())
        .max_items(5)
        .no_limit(true)
        .build();
    let job = h.acquirer.download_playlist(request).await.unwrap();

    assert_eq!(job.items_completed, 5);
    assert_eq!(files_in(&h.library()).len(), 5);
    assert!(job.output_path.unwrap().ends_with("library"));
}

fn items_with_subtitles(n: usize) -> Vec<Vec<(String, usize)>> {
    (1..=n)
        .map(|i| {
            vec![
                (format!("Ep{:02} [e{}].mp4", i, i), 4000 + i),
                (format!("Ep{:02} [e{}].en.vtt", i, i), 40 + i),
            ]
        })
        .collect()
}

fn count_with_suffix(names: &[String], suffix: &str) -> usize {
    names.iter().filter(|n| n.ends_with(suffix)).count()
}

#[tokio::test]
async fn test_playlist_cap_counts_items_not_sidecars() {
    let h = Harness::new(FakeEngine::scripted(vec![Step::Items {
        items: items_with_subtitles(8),
        honor_limit: true,
    }]));

    let request = PlaylistRequest::builder()
        .url("https://example.com/playlist/season-2")
        .destination(h.library())
        .max_items(5)
        .build();
    let job = h.acquirer.download_playlist(request).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.items_completed, 5);
    let names = files_in(&h.library());
    assert_eq!(count_with_suffix(&names, ".mp4"), 5);
    assert_eq!(count_with_suffix(&names, ".en.vtt"), 5);
}

#[tokio::test]
async fn test_playlist_overproduction_keeps_whole_items() {
    let h = Harness::new(FakeEngine::scripted(vec![Step::Items {
        items: items_with_subtitles(8),
        honor_limit: false,
    }]));

    let request = PlaylistRequest::builder()
        .url("https://example.com/playlist/season-2")
        .destination(h.library())
        .max_items(3)
        .build();
    let job = h.acquirer.download_playlist(request).await.unwrap();

    assert_eq!(job.items_completed, 3);
    let names = files_in(&h.library());
    assert_eq!(
        names,
        vec![
            "Ep01 [e1].en.vtt",
            "Ep01 [e1].mp4",
            "Ep02 [e2].en.vtt",
            "Ep02 [e2].mp4",
            "Ep03 [e3].en.vtt",
            "Ep03 [e3].mp4",
        ]
    );
}

#[tokio::test]
async fn test_playlist_configured_default_cap() {
    let settings = AcquireSettings {
        playlist_max_items: Some(3),
        ..AcquireSettings::default()
    };
    let h = Harness::with_settings(
        FakeEngine::scripted(vec![
            Step::Write(playlist_items(6)),
            Step::Write(playlist_items(6)),
        ]),
        settings,
    );

    let capped = h
        .acquirer
        .download_playlist(
            PlaylistRequest::builder()
                .url("https://example.com/playlist/a")
                .destination(h.library().join("a"))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(capped.items_completed, 3);

    let unbounded = h
        .acquirer
        .download_playlist(
            PlaylistRequest::builder()
                .url("https://example.com/playlist/b")
                .destination(h.library().join("b"))
                .no_limit(true)
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(unbounded.items_completed, 6);
}

#[tokio::test]
async fn test_special_characters_sanitized_on_nas_move() {
    let h = Harness::new(FakeEngine::writing(vec![(
        "Live #42 | Full Set [abc123].mp4",
        1024,
    )]));

    let job = h
        .acquirer
        .download(download("https://example.com/watch/abc123", &h.nas()))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.output_path.unwrap().ends_with("Live _42 _ Full Set [abc123].mp4"));

    let names = files_in(&h.nas());
    assert_eq!(names, vec!["Live _42 _ Full Set [abc123].mp4"]);
    assert!(names.iter().all(|n| !n.ends_with(".part")));

    assert_eq!(workspace_count(&h.workspace_root()), 0);
    assert_eq!(h.metrics.snapshot().remote_moves, 1);
}

#[tokio::test]
async fn test_auth_failures_refresh_cookies_then_succeed() {
    let h = Harness::new(FakeEngine::scripted(vec![
        Step::Fail(auth_failure()),
        Step::Fail(auth_failure()),
    ]));

    let request = DownloadRequest::builder()
        .url("https://example.com/members/abc")
        .destination(h.library())
        .profile("member")
        .build();
    let job = h.acquirer.download(request).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(h.engine.calls(), 3);
    // first fetch plus two refreshes
    assert_eq!(h.extractions(), 3);
    assert_eq!(h.metrics.snapshot().auth_refreshes, 2);

    let cookies = h.engine.cookies.lock().unwrap();
    assert!(cookies.iter().all(|c| matches!(c, Some(CookiePayload::Netscape(_)))));
    assert_ne!(cookies[0], cookies[2]);
}

#[tokio::test]
async fn test_auth_exhaustion_fails_job() {
    let h = Harness::new(FakeEngine::scripted(vec![
        Step::Fail(auth_failure()),
        Step::Fail(auth_failure()),
        Step::Fail(auth_failure()),
    ]));

    let request = DownloadRequest::builder()
        .url("https://example.com/members/abc")
        .destination(h.library())
        .profile("member")
        .build();
    let err = h.acquirer.download(request).await.unwrap_err();

    assert!(matches!(err, AcquireError::AuthExhausted { attempts: 3, .. }));
    let job = h.acquirer.jobs().get(err.job_id().unwrap()).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(matches!(
        job.error,
        Some(JobFailure::AuthExhausted { attempts: 3, .. })
    ));
    assert_eq!(workspace_count(&h.workspace_root()), 0);
}

#[tokio::test]
async fn test_engine_without_output_fails_job() {
    let h = Harness::new(FakeEngine::writing(vec![]));

    let err = h
        .acquirer
        .download(download("https://example.com/watch/empty", &h.library()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AcquireError::EngineFailure {
            class: EngineFailureClass::NoOutput,
            ..
        }
    ));
    let job = h.acquirer.jobs().get(err.job_id().unwrap()).unwrap();
    assert!(matches!(
        job.error,
        Some(JobFailure::EngineFailure {
            class: EngineFailureClass::NoOutput,
            ..
        })
    ));
}

#[tokio::test]
async fn test_empty_engine_output_fails_job() {
    let h = Harness::new(FakeEngine::writing(vec![("hollow [abc].mp4", 0)]));

    let err = h
        .acquirer
        .download(download("https://example.com/watch/abc", &h.library()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AcquireError::EngineFailure {
            class: EngineFailureClass::NoOutput,
            ..
        }
    ));
    let job = h.acquirer.jobs().get(err.job_id().unwrap()).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.output_path.is_none());
    assert!(files_in(&h.library()).is_empty());
}

#[tokio::test]
async fn test_move_failure_keeps_workspace() {
    let h = Harness::new(FakeEngine::writing(vec![("clip [abc].mp4", 64)]));

    // a directory squatting on the final file name
    std::fs::create_dir_all(h.library().join("clip [abc].mp4")).unwrap();

    let err = h
        .acquirer
        .download(download("https://example.com/watch/abc", &h.library()))
        .await
        .unwrap_err();

    let AcquireError::MoveFailure { temp_path, .. } = &err else {
        panic!("expected move failure, got {:?}", err);
    };
    assert!(temp_path.exists());
    assert_eq!(workspace_count(&h.workspace_root()), 1);

    let job = h.acquirer.jobs().get(err.job_id().unwrap()).unwrap();
    assert!(matches!(job.error, Some(JobFailure::MoveFailure { .. })));
}

#[tokio::test]
async fn test_abort_stops_running_job() {
    let h = Harness::new(FakeEngine::scripted(vec![Step::Hang]));

    let acquirer = h.acquirer.clone();
    let library = h.library();
    let task = tokio::spawn(async move {
        acquirer
            .download(download("https://example.com/watch/slow", &library))
            .await
    });

    let job_id = loop {
        let running = h
            .acquirer
            .jobs()
            .list()
            .into_iter()
            .find(|j| j.status == JobStatus::Processing);
        if let Some(job) = running {
            break job.id;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    assert_eq!(h.acquirer.jobs().abort_active(), vec![job_id]);

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, AcquireError::Aborted { .. }));

    let job = h.acquirer.jobs().get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, Some(JobFailure::Aborted));
    assert_eq!(workspace_count(&h.workspace_root()), 0);
}

#[tokio::test]
async fn test_batch_download_keeps_request_order() {
    let settings = AcquireSettings {
        max_inflight_jobs: 2,
        ..AcquireSettings::default()
    };
    let h = Harness::with_settings(FakeEngine::scripted(vec![]), settings);

    let urls = ["one", "two", "three", "four"];
    let requests = urls
        .iter()
        .map(|slug| download(&format!("https://example.com/watch/{}", slug), &h.library()))
        .collect();

    let results = h.acquirer.download_batch(requests).await;

    assert_eq!(results.len(), urls.len());
    for (slug, result) in urls.iter().zip(&results) {
        let job = result.as_ref().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.source.ends_with(slug));
        assert!(job.output_path.as_ref().unwrap().ends_with(&format!("{} [id].mp4", slug)));
    }
    assert_eq!(h.engine.calls(), 4);
    assert_eq!(h.metrics.snapshot().jobs_created, 4);
}
