//! The transfer coordinator.
//!
//! A [`Download`] probes its resource once, then each run plans the segments,
//! spawns one worker per unfinished segment, waits on the run's barriers and
//! merges the temp files once every segment has finished. Temp files left
//! behind by a stopped or failed run are the resume state for the next one.
use crate::config::{DownloadConfig, Options};
use crate::error::{DownloadError, Result};
use crate::latch::Barriers;
use crate::merge::merge_segments;
use crate::observer::{ProgressObserver, SerializedObserver};
use crate::planner::{Plan, plan_multi, plan_single};
use crate::probe::ResourceDescriptor;
use crate::worker::{WorkerContext, download_segment};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Lifecycle of a [`Download`]'s most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// All segments finished and were merged into the final file.
    Completed,
    /// The run was stopped; partial files stay on disk for resume.
    Stopped,
}

enum Terminal {
    Done,
    Cancelled,
    Exhausted,
}

/// One resource being fetched into one file, across any number of runs.
pub struct Download {
    config: DownloadConfig,
    descriptor: ResourceDescriptor,
    client: reqwest::Client,
    observer: Arc<dyn ProgressObserver>,
    /// Held for the whole of a run; at most one run per download.
    interlock: tokio::sync::Mutex<()>,
    cancel: Mutex<CancellationToken>,
    state: Mutex<RunState>,
    complete: AtomicBool,
    segment_paths: Mutex<Vec<PathBuf>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn build_client(user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(DownloadError::Client)
}

async fn create_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| DownloadError::Setup {
            path: path.to_path_buf(),
            source,
        })
}

impl Download {
    /// Probes `url` and resolves `options` against what the server reports.
    pub async fn new(
        url: &str,
        options: Options,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| DownloadError::InvalidUrl(format!("{url}: {e}")))?;
        let user_agent = options.user_agent().to_string();
        let client = build_client(&user_agent)?;
        let descriptor = ResourceDescriptor::probe(&client, url, &user_agent).await;
        Self::assemble(client, descriptor, &options, observer)
    }

    /// Builds a download from a descriptor obtained elsewhere, skipping the probe.
    pub fn with_descriptor(
        descriptor: ResourceDescriptor,
        options: Options,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<Self> {
        let client = build_client(&descriptor.user_agent)?;
        Self::assemble(client, descriptor, &options, observer)
    }

    fn assemble(
        client: reqwest::Client,
        descriptor: ResourceDescriptor,
        options: &Options,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<Self> {
        let config = DownloadConfig::resolve(options, &descriptor)?;
        debug!(?config, "resolved download configuration");

        Ok(Self {
            config,
            descriptor,
            client,
            observer: Arc::new(SerializedObserver::new(observer)),
            interlock: tokio::sync::Mutex::new(()),
            cancel: Mutex::new(CancellationToken::new()),
            state: Mutex::new(RunState::Idle),
            complete: AtomicBool::new(false),
            segment_paths: Mutex::new(Vec::new()),
        })
    }

    /// Runs the transfer on the current task until it completes, stops or fails.
    pub async fn start(&self) -> Result<Outcome> {
        let token = self.arm();
        self.run(token).await
    }

    /// Runs the transfer on a background task.
    pub fn start_async(self: &Arc<Self>) -> JoinHandle<Result<Outcome>> {
        let token = self.arm();
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(token).await })
    }

    /// Signals the running transfer to stop and waits until no worker is
    /// writing any more.
    pub async fn stop(&self) {
        self.stop_async();
        drop(self.interlock.lock().await);
    }

    /// Signals the running transfer to stop without waiting for it.
    pub fn stop_async(&self) {
        lock(&self.cancel).cancel();
    }

    /// Token for the next run. A cancelled token is replaced; a live one is
    /// shared, so a stop reaches runs that are still queued on the interlock.
    fn arm(&self) -> CancellationToken {
        let mut current = lock(&self.cancel);
        if current.is_cancelled() {
            *current = CancellationToken::new();
        }
        current.clone()
    }

    fn set_state(&self, state: RunState) {
        *lock(&self.state) = state;
    }

    async fn run(&self, token: CancellationToken) -> Result<Outcome> {
        let _interlock = self.interlock.lock().await;

        if token.is_cancelled() {
            self.set_state(RunState::Stopped);
            return Ok(Outcome::Stopped);
        }
        self.set_state(RunState::Running);

        let result = self.transfer(&token).await;
        self.set_state(match &result {
            Ok(Outcome::Completed) => RunState::Completed,
            Ok(Outcome::Stopped) => RunState::Stopped,
            Err(_) => RunState::Failed,
        });
        result
    }

    async fn prepare(&self) -> Result<Plan> {
        create_dir(self.config.directory()).await?;

        let threads = self.config.thread_count();
        if threads > 1
            && let Some(length) = self.descriptor.content_length
        {
            create_dir(self.config.temp_directory()).await?;
            Ok(plan_multi(
                length,
                threads,
                self.config.temp_directory(),
                self.config.file_name(),
            )
            .await)
        } else {
            Ok(plan_single(self.descriptor.content_length, self.config.file_path()).await)
        }
    }

    async fn transfer(&self, token: &CancellationToken) -> Result<Outcome> {
        let plan = self.prepare().await?;
        *lock(&self.segment_paths) = plan.temp_paths();

        let barriers = Arc::new(Barriers::new(plan.len()));
        for segment in plan.segments.iter().filter(|s| s.completed) {
            debug!(segment = segment.index, "already on disk");
            barriers.skip();
        }

        info!(
            file = %self.config.file_path().display(),
            segments = plan.len(),
            pending = plan.len() - plan.completed_count(),
            resumed = plan.resumed_bytes(),
            "starting transfer"
        );
        self.observer.resumed(plan.resumed_bytes());

        let ctx = WorkerContext {
            client: self.client.clone(),
            url: self.descriptor.url.clone(),
            user_agent: self.config.user_agent().to_string(),
            observer: self.observer.clone(),
            token: token.clone(),
            barriers: barriers.clone(),
        };

        let mut pool = JoinSet::new();
        for segment in plan.pending() {
            debug!(
                segment = segment.index,
                begin = segment.begin,
                end = ?segment.end,
                "dispatching worker"
            );
            pool.spawn(download_segment(segment.clone(), ctx.clone()));
        }

        let terminal = tokio::select! {
            biased;
            _ = barriers.done.wait() => Terminal::Done,
            _ = token.cancelled() => Terminal::Cancelled,
            _ = barriers.stop.wait() => Terminal::Exhausted,
        };

        // Every worker has to be out of its file before anything else happens.
        barriers.stop.wait().await;
        drain(&mut pool).await;

        match terminal {
            Terminal::Cancelled => {
                info!(file = %self.config.file_name(), "transfer stopped");
                self.observer.message("Stopped".to_string());
                Ok(Outcome::Stopped)
            }
            Terminal::Exhausted if barriers.unfinished() > 0 => {
                let planned = plan.len();
                let finished = planned - barriers.unfinished();
                warn!(finished, planned, "transfer incomplete");
                Err(DownloadError::Incomplete { finished, planned })
            }
            Terminal::Done | Terminal::Exhausted => self.finish(&plan).await,
        }
    }

    async fn finish(&self, plan: &Plan) -> Result<Outcome> {
        merge_segments(&plan.temp_paths(), self.config.file_path())
            .await
            .map_err(DownloadError::Merge)?;
        self.complete.store(true, Ordering::SeqCst);
        self.observer.finish();
        info!(file = %self.config.file_path().display(), "transfer complete");
        Ok(Outcome::Completed)
    }

    pub fn thread_count(&self) -> usize {
        self.config.thread_count()
    }

    pub fn directory(&self) -> &Path {
        self.config.directory()
    }

    pub fn temp_directory(&self) -> &Path {
        self.config.temp_directory()
    }

    pub fn file_name(&self) -> &str {
        self.config.file_name()
    }

    pub fn file_path(&self) -> &Path {
        self.config.file_path()
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// True once a run has merged the final file.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    /// Temp files of the most recent run, in merge order.
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        lock(&self.segment_paths).clone()
    }
}

async fn drain<T: 'static>(pool: &mut JoinSet<T>) {
    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "segment task did not finish cleanly");
        }
    }
}
