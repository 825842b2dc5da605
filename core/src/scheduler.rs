//! Scheduler core: named jobs on independent single-worker timelines.
//!
//! RULES:
//!   - Each timeline owns one worker thread. Jobs on the same timeline
//!     never overlap; different timelines run concurrently.
//!   - Initial delays are computed once, at start(). Each later firing is
//!     exactly one trigger period after the previous one.
//!   - Manual runs execute on the caller's thread through the same
//!     invoke() path, and take the same per-timeline lane.
//!   - A job that errors or panics is logged and recorded in its status.
//!     It never takes the worker down.
//!   - Each start() is a new generation. A worker only stamps next_run_at
//!     for jobs still owned by its generation, so a worker detached by
//!     stop() cannot overwrite the schedule of a later start().

use crate::{
    clock::Clock,
    error::{BatchError, BatchResult},
    job::{BatchStatus, JobId, JobOutcome, JobReport, JobStatus, RunSource, Timeline},
    trigger::Trigger,
};
use chrono::NaiveDateTime;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// The body of a job. Receives who triggered it.
pub type JobAction = Arc<dyn Fn(RunSource) -> BatchResult<JobReport> + Send + Sync>;

pub struct Scheduler {
    clock:       Arc<dyn Clock>,
    jobs:        Vec<Arc<RegisteredJob>>,
    lanes:       BTreeMap<Timeline, Arc<Mutex<()>>>,
    runtime:     Mutex<Option<Runtime>>,
    generations: AtomicU64,
}

struct RegisteredJob {
    id:      JobId,
    trigger: Trigger,
    action:  JobAction,
    lane:    Arc<Mutex<()>>,
    state:   Mutex<JobState>,
}

#[derive(Debug, Default)]
struct JobState {
    /// Generation whose worker owns `next_run_at`; 0 when none does.
    generation:   u64,
    running:      bool,
    last_run_at:  Option<NaiveDateTime>,
    last_outcome: Option<JobOutcome>,
    next_run_at:  Option<NaiveDateTime>,
}

struct Runtime {
    generation:  u64,
    shutdown_tx: Sender<()>,
    done_rx:     Receiver<Timeline>,
    workers:     BTreeMap<Timeline, JoinHandle<()>>,
}

/// Result of stop(): which timelines finished their in-flight run within
/// the drain window and which were detached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopReport {
    pub drained:   Vec<Timeline>,
    pub abandoned: Vec<Timeline>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            jobs: Vec::new(),
            lanes: BTreeMap::new(),
            runtime: Mutex::new(None),
            generations: AtomicU64::new(0),
        }
    }

    /// Register a job. Only allowed while stopped.
    pub fn register(&mut self, job: JobId, trigger: Trigger, action: JobAction) -> BatchResult<()> {
        if self.is_running() {
            return Err(BatchError::AlreadyRunning);
        }
        trigger
            .validate()
            .map_err(|e| BatchError::Config(format!("trigger for {job}: {e}")))?;
        if self.find(job).is_some() {
            return Err(BatchError::DuplicateJob { job });
        }

        let lane = Arc::clone(self.lanes.entry(job.timeline()).or_default());
        self.jobs.push(Arc::new(RegisteredJob {
            id: job,
            trigger,
            action,
            lane,
            state: Mutex::new(JobState::default()),
        }));
        log::debug!("scheduler: registered {job} ({trigger}) on {}", job.timeline());
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.runtime).is_some()
    }

    /// Compute every job's initial delay from the clock and spawn one
    /// worker per timeline. On failure no job keeps a next run stamp and
    /// workers already spawned exit on their own.
    pub fn start(&self) -> BatchResult<()> {
        let mut runtime = lock(&self.runtime);
        if runtime.is_some() {
            return Err(BatchError::AlreadyRunning);
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Timeline>();

        match self.spawn_workers(generation, &shutdown_rx, &done_tx) {
            Ok(workers) => {
                *runtime = Some(Runtime { generation, shutdown_tx, done_rx, workers });
                log::info!("scheduler: started {} timeline(s)", self.lanes.len());
                Ok(())
            }
            Err(e) => {
                self.release(generation);
                log::error!("scheduler: start failed: {e}");
                Err(e)
            }
        }
    }

    fn spawn_workers(
        &self,
        generation: u64,
        shutdown_rx: &Receiver<()>,
        done_tx: &Sender<Timeline>,
    ) -> BatchResult<BTreeMap<Timeline, JoinHandle<()>>> {
        let now = self.clock.now();
        let origin = Instant::now();
        let mut workers = BTreeMap::new();

        for (&timeline, lane) in &self.lanes {
            let mut slots = Vec::new();
            for job in self.jobs.iter().filter(|j| j.id.timeline() == timeline) {
                let delay = job.trigger.initial_delay(now).ok_or_else(|| {
                    BatchError::Config(format!("trigger for {} never fires", job.id))
                })?;
                let delay_std = delay.to_std().unwrap_or_default();
                job.update(|s| {
                    s.generation = generation;
                    s.next_run_at = Some(now + delay);
                });
                log::info!(
                    "scheduler: {} ({}) first run at {} on {timeline}",
                    job.id,
                    job.trigger,
                    now + delay
                );
                slots.push(Slot {
                    job:    Arc::clone(job),
                    next:   origin + delay_std,
                    period: job.trigger.period().to_std().unwrap_or(Duration::from_secs(3600)),
                });
            }

            let worker = TimelineWorker {
                timeline,
                generation,
                slots,
                lane: Arc::clone(lane),
                clock: Arc::clone(&self.clock),
                shutdown_rx: shutdown_rx.clone(),
                done_tx: done_tx.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("batch-{timeline}"))
                .spawn(move || worker.run())?;
            workers.insert(timeline, handle);
        }
        Ok(workers)
    }

    /// Drop every next run stamp owned by `generation`.
    fn release(&self, generation: u64) {
        for job in &self.jobs {
            job.update_for(generation, |s| {
                s.generation = 0;
                s.next_run_at = None;
            });
        }
    }

    /// Stop scheduling and wait up to `drain` for in-flight runs. Workers
    /// still busy after the window are detached: they finish their current
    /// run in the background and never fire again.
    pub fn stop(&self, drain: Duration) -> BatchResult<StopReport> {
        let Runtime { generation, shutdown_tx, done_rx, mut workers } =
            lock(&self.runtime).take().ok_or(BatchError::NotRunning)?;
        self.release(generation);

        // Disconnecting the channel wakes every idle worker.
        drop(shutdown_tx);

        let deadline = Instant::now() + drain;
        let mut report = StopReport::default();
        while !workers.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match done_rx.recv_timeout(remaining) {
                Ok(timeline) => {
                    if let Some(handle) = workers.remove(&timeline) {
                        if handle.join().is_err() {
                            log::warn!("scheduler: {timeline} worker panicked during shutdown");
                        }
                    }
                    report.drained.push(timeline);
                }
                Err(_) => break,
            }
        }

        report.abandoned = workers.keys().copied().collect();
        if !report.abandoned.is_empty() {
            log::warn!(
                "scheduler: {:?} did not drain within {drain:?}; detaching",
                report.abandoned
            );
        }
        log::info!("scheduler: stopped");
        Ok(report)
    }

    /// Run a job now, synchronously, bypassing its trigger.
    pub fn run_now(&self, job: JobId) -> BatchResult<JobReport> {
        let registered = self.find(job).ok_or(BatchError::JobNotRegistered { job })?;
        invoke(registered, self.clock.as_ref(), RunSource::Manual)
    }

    pub fn status(&self) -> BatchStatus {
        BatchStatus {
            running: self.is_running(),
            jobs:    self.jobs.iter().map(|j| j.snapshot()).collect(),
        }
    }

    pub fn jobs(&self) -> impl Iterator<Item = JobId> + '_ {
        self.jobs.iter().map(|j| j.id)
    }

    fn find(&self, job: JobId) -> Option<&RegisteredJob> {
        self.jobs.iter().find(|j| j.id == job).map(|j| j.as_ref())
    }
}

impl RegisteredJob {
    fn update(&self, f: impl FnOnce(&mut JobState)) {
        f(&mut lock(&self.state));
    }

    /// Apply `f` only while `generation` still owns this job's schedule.
    fn update_for(&self, generation: u64, f: impl FnOnce(&mut JobState)) {
        let mut state = lock(&self.state);
        if state.generation == generation {
            f(&mut state);
        }
    }

    fn snapshot(&self) -> JobStatus {
        let state = lock(&self.state);
        JobStatus {
            job:          self.id,
            timeline:     self.id.timeline(),
            trigger:      self.trigger,
            running:      state.running,
            last_run_at:  state.last_run_at,
            last_outcome: state.last_outcome.clone(),
            next_run_at:  state.next_run_at,
        }
    }
}

struct Slot {
    job:    Arc<RegisteredJob>,
    next:   Instant,
    period: Duration,
}

struct TimelineWorker {
    timeline:    Timeline,
    generation:  u64,
    slots:       Vec<Slot>,
    lane:        Arc<Mutex<()>>,
    clock:       Arc<dyn Clock>,
    shutdown_rx: Receiver<()>,
    done_tx:     Sender<Timeline>,
}

impl TimelineWorker {
    fn run(mut self) {
        log::debug!("timeline={} worker up with {} job(s)", self.timeline, self.slots.len());

        while let Some(idx) = self.earliest_slot() {
            let wait = self.slots[idx].next.saturating_duration_since(Instant::now());
            match self.shutdown_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let slot = &mut self.slots[idx];
            {
                let _lane = lock(&self.lane);
                let _ = invoke(&slot.job, self.clock.as_ref(), RunSource::Scheduled);
            }

            slot.next += slot.period;
            let until = slot.next.saturating_duration_since(Instant::now());
            let next_at = chrono::Duration::from_std(until)
                .ok()
                .map(|d| self.clock.now() + d);
            slot.job.update_for(self.generation, |s| s.next_run_at = next_at);
        }

        log::debug!("timeline={} worker down", self.timeline);
        let _ = self.done_tx.send(self.timeline);
    }

    fn earliest_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.next)
            .map(|(i, _)| i)
    }
}

/// The single code path for every run, scheduled or manual.
/// Scheduled callers already hold the lane; manual callers take it here.
fn invoke(job: &RegisteredJob, clock: &dyn Clock, source: RunSource) -> BatchResult<JobReport> {
    let _lane = match source {
        RunSource::Manual    => Some(lock(&job.lane)),
        RunSource::Scheduled => None,
    };

    let started = clock.now();
    job.update(|s| s.running = true);
    log::info!("job={} {source} run started", job.id);

    let result = match panic::catch_unwind(AssertUnwindSafe(|| (job.action)(source))) {
        Ok(result) => result,
        Err(_) => Err(BatchError::JobPanicked { job: job.id }),
    };

    let outcome = match &result {
        Ok(report) => {
            log::info!("job={} {source} run finished: {}", job.id, report.summary);
            JobOutcome::Succeeded { summary: report.summary.clone() }
        }
        Err(e) => {
            log::error!("job={} {source} run failed: {e}", job.id);
            JobOutcome::Failed { error: e.to_string() }
        }
    };

    job.update(|s| {
        s.running = false;
        s.last_run_at = Some(started);
        s.last_outcome = Some(outcome);
    });
    result
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
