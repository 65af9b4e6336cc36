//! Restartable interval timer.
//!
//! Each timer owns a worker thread that waits for an arm signal, counts
//! down the interval and then notifies its subscribers. The countdown does
//! not repeat by itself: callers re-arm with [`IntervalTimer::go`], which
//! lets them throttle the cadence on their own work (e.g. only re-arm the
//! sampling timer once the previous sample has been processed).
//!
//! ```text
//! Idle --go--> Armed --> Counting --elapsed--> Idle
//!   any state --stop--> Stopped
//! ```

use crate::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Waiting for the next arm signal.
    Idle,
    /// Armed, the worker has not picked up the signal yet.
    Armed,
    /// Counting down the interval.
    Counting,
    /// Permanently disabled.
    Stopped,
}

type Callback = Arc<dyn Fn() + Send + Sync>;

/// State shared with the worker thread.
struct Shared {
    name: String,
    interval: Duration,
    state: Mutex<TimerState>,
    signal: Condvar,
    callbacks: Mutex<Vec<Callback>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Worker loop: wait for arm, count down, notify.
    fn run(&self) {
        loop {
            let mut state = self.state();
            while *state == TimerState::Idle {
                state = self
                    .signal
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if *state == TimerState::Stopped {
                break;
            }

            *state = TimerState::Counting;
            debug!("{}: started", self.name);

            let deadline = Instant::now() + self.interval;
            loop {
                if *state == TimerState::Stopped {
                    debug!("{}: countdown interrupted", self.name);
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                state = self
                    .signal
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }

            *state = TimerState::Idle;
            drop(state);

            debug!("{}: ticked", self.name);
            self.notify();
        }
        debug!("{}: worker exiting", self.name);
    }

    fn notify(&self) {
        let callbacks: Vec<Callback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for callback in callbacks {
            if *self.state() == TimerState::Stopped {
                return;
            }
            if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                warn!("{}: ready callback panicked", self.name);
            }
        }
    }
}

/// Interval timer driven by a dedicated worker thread.
pub struct IntervalTimer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalTimer {
    /// Creates a timer and starts its worker thread in the idle state.
    ///
    /// If the thread cannot be spawned the timer starts out stopped and
    /// every [`go`](Self::go) is rejected.
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            name: name.into(),
            interval,
            state: Mutex::new(TimerState::Idle),
            signal: Condvar::new(),
            callbacks: Mutex::new(Vec::new()),
        });

        let worker_shared = shared.clone();
        let worker = match thread::Builder::new()
            .name(shared.name.clone())
            .spawn(move || worker_shared.run())
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("{}: {}", Error::TimerSpawn(shared.name.clone()), e);
                *shared.state() = TimerState::Stopped;
                None
            }
        };

        Self {
            shared,
            worker: Mutex::new(worker),
        }
    }

    /// Registers a callback fired on the timer thread each time the
    /// interval elapses. Callbacks run in registration order.
    pub fn on_ready<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Arms the next countdown.
    ///
    /// Returns false without effect if a countdown is already pending or
    /// the timer has been stopped.
    pub fn go(&self) -> bool {
        let mut state = self.shared.state();
        if *state != TimerState::Idle {
            debug!("{}: go rejected while {:?}", self.shared.name, *state);
            return false;
        }
        *state = TimerState::Armed;
        self.shared.signal.notify_all();
        true
    }

    /// Stops the timer for good and releases its worker thread.
    ///
    /// A pending countdown is abandoned without firing. Called from outside
    /// the timer thread this waits for the worker to exit, so no callback
    /// runs after it returns. Stopping twice is a no-op.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state();
            if *state != TimerState::Stopped {
                *state = TimerState::Stopped;
                debug!("{}: stopped", self.shared.name);
            }
            self.shared.signal.notify_all();
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            // Stopped from one of our own callbacks: the worker exits once
            // the callback returns.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("{}: worker thread panicked", self.shared.name);
            }
        }
    }

    /// Returns the timer name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the countdown interval.
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Returns the current state.
    pub fn state(&self) -> TimerState {
        *self.shared.state()
    }

    /// Returns true while a countdown is pending.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), TimerState::Armed | TimerState::Counting)
    }

    /// Returns false once the timer has been stopped.
    pub fn is_alive(&self) -> bool {
        self.state() != TimerState::Stopped
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for IntervalTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalTimer")
            .field("name", &self.shared.name)
            .field("interval", &self.shared.interval)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    const SHORT: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(5);

    fn counting_timer(interval: Duration) -> (IntervalTimer, mpsc::Receiver<()>) {
        let timer = IntervalTimer::new("test", interval);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        timer.on_ready(move || {
            let _ = tx.lock().unwrap().send(());
        });
        (timer, rx)
    }

    #[test]
    fn test_new_timer_is_idle() {
        let timer = IntervalTimer::new("idle", SHORT);
        assert_eq!(timer.name(), "idle");
        assert_eq!(timer.interval(), SHORT);
        assert_eq!(timer.state(), TimerState::Idle);
        assert!(timer.is_alive());
        assert!(!timer.is_running());
    }

    #[test]
    fn test_go_twice_rejected() {
        let timer = IntervalTimer::new("twice", Duration::from_secs(10));
        assert!(timer.go());
        assert!(!timer.go());
        assert!(timer.is_running());
    }

    #[test]
    fn test_fires_once_per_arm() {
        let (timer, rx) = counting_timer(SHORT);

        // Never fires without being armed
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        assert!(timer.go());
        rx.recv_timeout(WAIT).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(timer.state(), TimerState::Idle);

        assert!(timer.go());
        rx.recv_timeout(WAIT).unwrap();
    }

    #[test]
    fn test_waits_for_interval() {
        let (timer, rx) = counting_timer(Duration::from_millis(100));
        let start = Instant::now();
        assert!(timer.go());
        rx.recv_timeout(WAIT).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_rearm_from_callback() {
        let timer = Arc::new(IntervalTimer::new("rearm", Duration::from_millis(5)));
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        let weak = Arc::downgrade(&timer);
        let counter = count.clone();
        timer.on_ready(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 5 {
                if let Some(timer) = weak.upgrade() {
                    assert!(timer.go());
                }
            } else {
                let _ = tx.lock().unwrap().send(());
            }
        });

        assert!(timer.go());
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_stop_interrupts_countdown() {
        let (timer, rx) = counting_timer(Duration::from_secs(30));
        assert!(timer.go());
        std::thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        timer.stop();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(timer.state(), TimerState::Stopped);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_stop_idle_and_twice() {
        let timer = IntervalTimer::new("stop", SHORT);
        timer.stop();
        timer.stop();
        assert!(!timer.is_alive());
        assert!(!timer.go());
    }

    #[test]
    fn test_stop_from_callback() {
        let timer = Arc::new(IntervalTimer::new("self-stop", SHORT));
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        let weak = Arc::downgrade(&timer);
        timer.on_ready(move || {
            if let Some(timer) = weak.upgrade() {
                timer.stop();
                let _ = tx.lock().unwrap().send(timer.go());
            }
        });

        assert!(timer.go());
        assert!(!rx.recv_timeout(WAIT).unwrap());
        assert!(!timer.is_alive());
    }

    #[test]
    fn test_panicking_callback_keeps_timer_alive() {
        let timer = IntervalTimer::new("panic", SHORT);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        timer.on_ready(|| panic!("boom"));
        timer.on_ready(move || {
            let _ = tx.lock().unwrap().send(());
        });

        assert!(timer.go());
        rx.recv_timeout(WAIT).unwrap();
        assert!(timer.go());
        rx.recv_timeout(WAIT).unwrap();
    }
}
