//! Idle-aware activity tracking.
//!
//! The host forwards an [`EditorSnapshot`] on every selection or
//! active-editor change. The tracker turns that stream into discrete work
//! sessions: a qualifying pulse on a new file starts a session and emits a
//! signal immediately, repeat pulses on the same file are debounced into
//! periodic heartbeats, and silence past the idle timeout ends the session
//! without emitting anything (the last heartbeat already recorded the last
//! known activity).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::Config;
use crate::host::{GitLookup, UserInterface};
use crate::reporter::EventReporter;
use crate::util::{lock_unpoisoned, TimerSlot};

/// What the editor looks like at the moment of an event.
#[derive(Debug, Clone, Default)]
pub struct EditorSnapshot {
    pub active_file: Option<PathBuf>,
    pub window_focused: bool,
}

/// One qualifying, non-debounced activity observation. Immutable; consumed
/// once by the reporter.
#[derive(Debug, Clone)]
pub struct ActivitySignal {
    pub file_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub git_remote_url: Option<String>,
}

#[derive(Default)]
struct TrackerState {
    current_file: Option<PathBuf>,
    session_start: Option<Instant>,
    last_signal_at: Option<Instant>,
}

pub struct ActivityTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    reporter: Arc<EventReporter>,
    git: Arc<dyn GitLookup>,
    ui: Arc<dyn UserInterface>,
    idle_timeout: Duration,
    debounce_window: Duration,
    ticker_interval: Duration,
    excluded_prefixes: Vec<String>,
    active: AtomicBool,
    state: Mutex<TrackerState>,
    idle_timer: Mutex<TimerSlot>,
    ticker: Mutex<TimerSlot>,
}

impl ActivityTracker {
    pub fn new(
        config: &Config,
        reporter: Arc<EventReporter>,
        git: Arc<dyn GitLookup>,
        ui: Arc<dyn UserInterface>,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                reporter,
                git,
                ui,
                idle_timeout: config.idle_timeout(),
                debounce_window: config.debounce_window(),
                ticker_interval: config.ticker_interval(),
                excluded_prefixes: config.excluded_file_prefixes.clone(),
                active: AtomicBool::new(false),
                state: Mutex::new(TrackerState::default()),
                idle_timer: Mutex::new(TimerSlot::default()),
                ticker: Mutex::new(TimerSlot::default()),
            }),
        }
    }

    pub fn activate(&self) {
        info!("activity tracking active");
        self.inner.active.store(true, Ordering::Release);
    }

    /// Stop tracking. Pulses are ignored until the next `activate`, and all
    /// timers are cleared so nothing fires against torn-down state.
    pub fn deactivate(&self) {
        self.inner.active.store(false, Ordering::Release);
        self.inner.clear_activity();
    }

    pub async fn handle_activity(&self, snapshot: EditorSnapshot) {
        self.inner.handle_activity(snapshot).await;
    }

    /// File of the session in progress, if any.
    pub fn current_file(&self) -> Option<PathBuf> {
        lock_unpoisoned(&self.inner.state).current_file.clone()
    }
}

impl TrackerInner {
    async fn handle_activity(self: &Arc<Self>, snapshot: EditorSnapshot) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }

        let Some(file) = snapshot.active_file else {
            debug!("no active file");
            self.clear_activity();
            return;
        };

        if !snapshot.window_focused {
            debug!("window lost focus");
            self.clear_activity();
            return;
        }

        if self.is_excluded(&file) {
            debug!(file = %file.display(), "skipping excluded file");
            return;
        }

        self.arm_idle_timer();

        let now = Instant::now();
        let (is_new_file, debounced) = {
            let state = lock_unpoisoned(&self.state);
            let same_file = state.current_file.as_deref() == Some(file.as_path());
            let debounced = same_file
                && state
                    .last_signal_at
                    .is_some_and(|last| now.duration_since(last) < self.debounce_window);
            (!same_file, debounced)
        };

        if debounced {
            return;
        }

        if is_new_file {
            {
                let mut state = lock_unpoisoned(&self.state);
                state.current_file = Some(file.clone());
                state.session_start = Some(now);
            }
            self.arm_ticker();
            self.ui.show_elapsed(Some(Duration::ZERO));
        }

        lock_unpoisoned(&self.state).last_signal_at = Some(now);

        debug!(file = %file.display(), "activity");
        let signal = ActivitySignal {
            git_remote_url: self.git.remote_url_for(&file),
            file_path: file,
            timestamp: Utc::now(),
        };
        self.reporter.report(signal).await;
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        self.excluded_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// The idle timer resets on every qualifying pulse; it only fires after a
    /// full timeout of silence.
    fn arm_idle_timer(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        lock_unpoisoned(&self.idle_timer).replace(tokio::spawn(async move {
            sleep(inner.idle_timeout).await;
            info!("idle limit reached");
            inner.clear_activity();
        }));
    }

    /// Periodic re-render of the elapsed-time display. Display only; no
    /// network event is emitted from here.
    fn arm_ticker(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        lock_unpoisoned(&self.ticker).replace(tokio::spawn(async move {
            let mut tick = interval(inner.ticker_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await; // first tick completes immediately
            loop {
                tick.tick().await;
                let elapsed = lock_unpoisoned(&inner.state)
                    .session_start
                    .map(|start| start.elapsed());
                inner.ui.show_elapsed(elapsed);
            }
        }));
    }

    /// Entering idle is a silence, not an event: state and timers are cleared
    /// and nothing is emitted.
    fn clear_activity(&self) {
        {
            let mut state = lock_unpoisoned(&self.state);
            state.current_file = None;
            state.session_start = None;
        }
        lock_unpoisoned(&self.idle_timer).clear();
        lock_unpoisoned(&self.ticker).clear();
        self.ui.show_elapsed(None);
    }
}
