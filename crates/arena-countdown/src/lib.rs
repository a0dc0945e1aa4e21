//! Per-second countdown timer for Arena fight phases.
//!
//! A [`CountdownTimer`] counts down from `T` seconds and reports every
//! step as a [`TimerEvent`] on an unbounded channel:
//!
//! ```text
//! start(T) → update(T-1) → … → update(1) → end(0)
//! ```
//!
//! An uninterrupted run emits exactly `T + 1` events. The timer can be
//! paused, resumed and cancelled from the owning task; those calls emit
//! their event synchronously, before they return.
//!
//! # Integration
//!
//! A fight actor gives every timer of the fight the same sink and reads
//! them all from one receiver inside its `tokio::select!` loop:
//!
//! ```ignore
//! let (sink, mut timer_rx) = mpsc::unbounded_channel();
//! let timer = CountdownTimer::start_with_sink(10, "choose", sink.clone());
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* player actions */ }
//!         Some(event) = timer_rx.recv() => { /* event.label tells timers apart */ }
//!     }
//! }
//! ```
//!
//! # Terminal events
//!
//! `end` always reports `running: true`, both on natural completion and on
//! cancellation. Existing consumers key off `type == "end"` and ignore the
//! flag; use [`CountdownTimer::is_running`] for the real state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Length of one countdown step.
pub const TICK: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What happened to the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerEventKind {
    Start,
    Update,
    Pause,
    Resume,
    End,
}

/// One step of a countdown, as delivered to the timer's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerEvent {
    #[serde(rename = "type")]
    pub kind: TimerEventKind,
    pub seconds_left: u32,
    pub running: bool,
    /// The label the timer was started with.
    pub label: String,
}

impl TimerEvent {
    /// `true` for the terminal `end` event.
    pub fn is_end(&self) -> bool {
        self.kind == TimerEventKind::End
    }
}

/// Receiving half of a timer's event channel.
pub type TimerEvents = mpsc::UnboundedReceiver<TimerEvent>;

/// Sending half of a timer's event channel.
pub type TimerSink = mpsc::UnboundedSender<TimerEvent>;

// ---------------------------------------------------------------------------
// Clock: the state shared between the handle and the tick task
// ---------------------------------------------------------------------------

struct Clock {
    label: String,
    total_seconds: u32,
    seconds_left: u32,
    running: bool,
    finished: bool,
    /// When the next step is due. `None` while paused or after the end.
    deadline: Option<Instant>,
    sink: TimerSink,
}

impl Clock {
    fn emit(&self, kind: TimerEventKind, running: bool) {
        trace!(label = %self.label, ?kind, seconds_left = self.seconds_left, "timer event");
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sink.send(TimerEvent {
            kind,
            seconds_left: self.seconds_left,
            running,
            label: self.label.clone(),
        });
    }

    /// One second elapsed. `at` is the deadline the tick task slept
    /// until; a pause or resume since then moved the deadline, which makes
    /// this tick stale.
    fn tick(&mut self, at: Instant) {
        if self.finished || !self.running || self.deadline != Some(at) {
            return;
        }
        self.seconds_left = self.seconds_left.saturating_sub(1);
        if self.seconds_left == 0 {
            self.finish();
        } else {
            self.deadline = Some(at + TICK);
            self.emit(TimerEventKind::Update, true);
        }
    }

    fn finish(&mut self) {
        self.seconds_left = 0;
        self.finished = true;
        self.deadline = None;
        self.emit(TimerEventKind::End, true);
        self.running = false;
    }
}

struct Shared {
    clock: Mutex<Clock>,
    wake: Notify,
}

impl Shared {
    fn clock(&self) -> MutexGuard<'_, Clock> {
        // The clock holds no invariants a panicking holder could break
        // halfway, so a poisoned lock is still usable.
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// CountdownTimer
// ---------------------------------------------------------------------------

/// A restartable, pausable, cancellable per-second countdown.
///
/// Owned exclusively by whoever started it. Dropping the timer stops it
/// without emitting anything further.
pub struct CountdownTimer {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl CountdownTimer {
    /// Starts a countdown with its own event channel.
    ///
    /// The `start` event is already in the returned receiver when this
    /// returns. Must be called from within a Tokio runtime.
    pub fn start(
        total_seconds: u32,
        label: impl Into<String>,
    ) -> (Self, TimerEvents) {
        let (sink, events) = mpsc::unbounded_channel();
        (Self::start_with_sink(total_seconds, label, sink), events)
    }

    /// Starts a countdown that reports to an existing channel.
    ///
    /// Lets several timers share one receiver; their events are told
    /// apart by [`TimerEvent::label`].
    pub fn start_with_sink(
        total_seconds: u32,
        label: impl Into<String>,
        sink: TimerSink,
    ) -> Self {
        let mut clock = Clock {
            label: label.into(),
            total_seconds,
            seconds_left: total_seconds,
            running: true,
            finished: false,
            deadline: Some(Instant::now() + TICK),
            sink,
        };
        debug!(label = %clock.label, total_seconds, "countdown started");

        clock.emit(TimerEventKind::Start, true);
        if total_seconds == 0 {
            clock.finish();
        }

        let finished = clock.finished;
        let shared = Arc::new(Shared {
            clock: Mutex::new(clock),
            wake: Notify::new(),
        });
        let task = (!finished).then(|| tokio::spawn(run(Arc::clone(&shared))));

        Self { shared, task }
    }

    /// Freezes the clock and emits `pause`.
    ///
    /// No-op if already paused or finished.
    pub fn pause(&self) {
        {
            let mut clock = self.shared.clock();
            if clock.finished || !clock.running {
                return;
            }
            clock.running = false;
            clock.deadline = None;
            clock.emit(TimerEventKind::Pause, false);
            debug!(label = %clock.label, seconds_left = clock.seconds_left, "countdown paused");
        }
        self.shared.wake.notify_one();
    }

    /// Emits `resume` and restarts a full one-second interval.
    ///
    /// Whatever fraction of a second elapsed before the pause is lost.
    /// No-op if running or finished.
    pub fn resume(&self) {
        {
            let mut clock = self.shared.clock();
            if clock.finished || clock.running {
                return;
            }
            clock.running = true;
            clock.deadline = Some(Instant::now() + TICK);
            clock.emit(TimerEventKind::Resume, true);
            debug!(label = %clock.label, seconds_left = clock.seconds_left, "countdown resumed");
        }
        self.shared.wake.notify_one();
    }

    /// Emits the terminal `end` immediately and stops for good.
    ///
    /// Works from running and paused states; no-op once finished.
    pub fn cancel(&self) {
        {
            let mut clock = self.shared.clock();
            if clock.finished {
                return;
            }
            clock.finish();
            debug!(label = %clock.label, "countdown cancelled");
        }
        self.shared.wake.notify_one();
    }

    /// The label the timer was started with.
    pub fn label(&self) -> String {
        self.shared.clock().label.clone()
    }

    /// The duration the timer was started with, in seconds.
    pub fn total_seconds(&self) -> u32 {
        self.shared.clock().total_seconds
    }

    /// Seconds remaining.
    pub fn seconds_left(&self) -> u32 {
        self.shared.clock().seconds_left
    }

    /// Whether the clock is currently counting (not paused, not finished).
    pub fn is_running(&self) -> bool {
        self.shared.clock().running
    }

    /// Whether the terminal `end` has been emitted.
    pub fn is_finished(&self) -> bool {
        self.shared.clock().finished
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clock = self.shared.clock();
        f.debug_struct("CountdownTimer")
            .field("label", &clock.label)
            .field("seconds_left", &clock.seconds_left)
            .field("running", &clock.running)
            .field("finished", &clock.finished)
            .finish()
    }
}

/// The tick loop. Sleeps until the next deadline, or until a control call
/// wakes it to re-read the clock.
async fn run(shared: Arc<Shared>) {
    loop {
        let deadline = {
            let clock = shared.clock();
            if clock.finished {
                break;
            }
            clock.deadline
        };

        match deadline {
            Some(at) => {
                tokio::select! {
                    _ = time::sleep_until(at) => shared.clock().tick(at),
                    _ = shared.wake.notified() => {}
                }
            }
            None => shared.wake.notified().await,
        }
    }
}
