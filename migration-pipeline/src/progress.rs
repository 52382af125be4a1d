use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use state_machines::state_machine;
use tracing::info;

use common::error::AppError;

/// How many terminal track snapshots are kept for the history endpoint.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// The two independently counted progress tracks: primary documents and
/// derived chunk documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Main,
    Vector,
}

impl Track {
    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Main => "main",
            Track::Vector => "vector",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl TrackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackState::NotStarted => "not_started",
            TrackState::Running => "running",
            TrackState::Completed => "completed",
            TrackState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackState::Completed | TrackState::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
enum TrackTransition {
    Start,
    Complete,
    Fail,
}

impl TrackTransition {
    fn as_str(&self) -> &'static str {
        match self {
            TrackTransition::Start => "start",
            TrackTransition::Complete => "complete",
            TrackTransition::Fail => "fail",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: TrackLifecycleMachine,
        initial: NotStarted,
        states: [NotStarted, Running, Completed, Failed],
        events {
            start {
                transition: { from: NotStarted, to: Running }
            }
            complete {
                transition: { from: Running, to: Completed }
            }
            fail {
                transition: { from: Running, to: Failed }
            }
        }
    }

    pub(super) fn not_started() -> TrackLifecycleMachine<(), NotStarted> {
        TrackLifecycleMachine::new(())
    }

    pub(super) fn running() -> TrackLifecycleMachine<(), Running> {
        not_started()
            .start()
            .expect("start transition from NotStarted should exist")
    }
}

fn invalid_transition(state: TrackState, event: TrackTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid track transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

fn compute_next_state(state: TrackState, event: TrackTransition) -> Result<TrackState, AppError> {
    use lifecycle::*;
    match (state, event) {
        (TrackState::NotStarted, TrackTransition::Start) => not_started()
            .start()
            .map(|_| TrackState::Running)
            .map_err(|_| invalid_transition(state, event)),
        (TrackState::Running, TrackTransition::Complete) => running()
            .complete()
            .map(|_| TrackState::Completed)
            .map_err(|_| invalid_transition(state, event)),
        (TrackState::Running, TrackTransition::Fail) => running()
            .fail()
            .map(|_| TrackState::Failed)
            .map_err(|_| invalid_transition(state, event)),
        _ => Err(invalid_transition(state, event)),
    }
}

/// Point-in-time view of one track, also the shape served by the status
/// and history endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: Option<String>,
    pub track: Track,
    pub state: TrackState,
    pub found: u64,
    pub processed: u64,
    pub failed: u64,
    pub percent_complete: f64,
    pub docs_per_second: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message: String,
}

impl RunStatus {
    fn new(track: Track) -> Self {
        Self {
            run_id: None,
            track,
            state: TrackState::NotStarted,
            found: 0,
            processed: 0,
            failed: 0,
            percent_complete: 0.0,
            docs_per_second: 0.0,
            started_at: None,
            finished_at: None,
            message: String::new(),
        }
    }
}

struct TrackProgress {
    status: RunStatus,
    /// A sealed found count is final; reaching it finalizes the track.
    found_sealed: bool,
}

impl TrackProgress {
    fn new(track: Track) -> Self {
        Self {
            status: RunStatus::new(track),
            found_sealed: false,
        }
    }
}

struct Inner {
    main: TrackProgress,
    vector: TrackProgress,
    history: VecDeque<RunStatus>,
    history_capacity: usize,
}

impl Inner {
    fn progress_mut(&mut self, track: Track) -> &mut TrackProgress {
        match track {
            Track::Main => &mut self.main,
            Track::Vector => &mut self.vector,
        }
    }

    fn apply(&mut self, track: Track, update: impl FnOnce(&mut TrackProgress)) {
        let now = Utc::now();
        let progress = self.progress_mut(track);
        if progress.status.state != TrackState::Running {
            return;
        }
        update(progress);
        recompute(&mut progress.status, now);

        let complete = progress.found_sealed
            && progress.status.found > 0
            && progress.status.processed + progress.status.failed >= progress.status.found;
        if complete {
            self.finalize(track, TrackState::Completed, "track complete", now);
        }
    }

    fn finalize(&mut self, track: Track, terminal: TrackState, message: &str, now: DateTime<Utc>) {
        let event = match terminal {
            TrackState::Completed => TrackTransition::Complete,
            _ => TrackTransition::Fail,
        };
        let progress = self.progress_mut(track);
        let Ok(next) = compute_next_state(progress.status.state, event) else {
            return;
        };
        progress.status.state = next;
        progress.status.finished_at = Some(now);
        progress.status.message = message.to_string();
        recompute(&mut progress.status, now);

        let snapshot = progress.status.clone();
        info!(
            track = track.as_str(),
            state = snapshot.state.as_str(),
            found = snapshot.found,
            processed = snapshot.processed,
            failed = snapshot.failed,
            "track finalized"
        );
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
    }
}

fn recompute(status: &mut RunStatus, now: DateTime<Utc>) {
    status.percent_complete = if status.found == 0 {
        0.0
    } else {
        status.processed as f64 / status.found as f64 * 100.0
    };

    let elapsed = match status.started_at {
        Some(start) => {
            let end = status.finished_at.unwrap_or(now);
            (end - start).num_milliseconds() as f64 / 1_000.0
        }
        None => 0.0,
    };
    status.docs_per_second = if elapsed > 0.0 {
        status.processed as f64 / elapsed
    } else {
        0.0
    };
}

/// Dual-track progress accounting for the active run.
///
/// All mutation happens under one internal lock held only for O(1)
/// bookkeeping, so counting calls from many tasks stay cheap.
pub struct ProgressTracker {
    inner: Mutex<Inner>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ProgressTracker {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                main: TrackProgress::new(Track::Main),
                vector: TrackProgress::new(Track::Vector),
                history: VecDeque::new(),
                history_capacity: history_capacity.max(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears both tracks back to their initial state. History survives.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.main = TrackProgress::new(Track::Main);
        inner.vector = TrackProgress::new(Track::Vector);
    }

    /// Moves both tracks to running under the given run id.
    pub fn start_tracking(&self, run_id: &str) -> Result<(), AppError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let main_next = compute_next_state(inner.main.status.state, TrackTransition::Start)?;
        let vector_next = compute_next_state(inner.vector.status.state, TrackTransition::Start)?;

        let now = Utc::now();
        inner.main.status.state = main_next;
        inner.vector.status.state = vector_next;
        for progress in [&mut inner.main, &mut inner.vector] {
            progress.status.run_id = Some(run_id.to_string());
            progress.status.started_at = Some(now);
            progress.status.message = "running".to_string();
        }
        Ok(())
    }

    /// Sets the final found count for a track. Once sealed, the track
    /// finalizes itself when processed + failed reaches it.
    pub fn set_found_total(&self, track: Track, total: u64) {
        self.lock().apply(track, |progress| {
            progress.status.found = total;
            progress.found_sealed = true;
        });
    }

    pub fn add_found(&self, track: Track, count: u64) {
        self.lock().apply(track, |progress| {
            progress.status.found += count;
        });
    }

    pub fn add_processed(&self, track: Track, count: u64) {
        self.lock().apply(track, |progress| {
            progress.status.processed += count;
        });
    }

    pub fn add_failed(&self, track: Track, count: u64) {
        self.lock().apply(track, |progress| {
            progress.status.failed += count;
        });
    }

    /// Drives any still-running track to the given terminal state. Used by
    /// the coordinator after all page tasks have joined, and for runs whose
    /// total was never known.
    pub fn force_finalize(&self, terminal: TrackState, message: &str) {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.finalize(Track::Main, terminal, message, now);
        inner.finalize(Track::Vector, terminal, message, now);
    }

    pub fn status(&self, track: Track) -> RunStatus {
        let inner = self.lock();
        match track {
            Track::Main => inner.main.status.clone(),
            Track::Vector => inner.vector.status.clone(),
        }
    }

    pub fn history(&self) -> Vec<RunStatus> {
        self.lock().history.iter().cloned().collect()
    }
}
