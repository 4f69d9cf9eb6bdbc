//! The periodic-task scheduler collaborator
//!
//! `spec.md` §4.4 and §9 ask for an injected `PeriodicDriver` capability
//! (`start`/`stop`/`schedule`) rather than binding the crate to one
//! event-loop library. [`ManualDriver`] is the manually-stepped mock the
//! spec requires for tests; [`ThreadDriver`] is a real implementation
//! backed by a dedicated `std::thread`.

use crate::common::{Result, SketchError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A capability that can invoke a callback at a fixed cadence
///
/// `spec.md` §5 assumes a single-threaded cooperative executor: the driver
/// is a collaborator that "yields between invocations" rather than racing
/// the filter it decays. [`ThreadDriver`] widens this to a real background
/// thread; per §5, that widening must be — and is — documented on the type.
pub trait PeriodicDriver {
    /// Registers the callback to invoke once [`PeriodicDriver::start`] runs,
    /// replacing any previously scheduled callback.
    fn schedule(&mut self, interval: Duration, callback: Box<dyn FnMut() + Send + 'static>);

    /// Begins invoking the scheduled callback at the configured cadence
    ///
    /// # Errors
    /// Returns [`SketchError::DriverStateError`] if already running.
    fn start(&mut self) -> Result<()>;

    /// Stops invoking the scheduled callback
    ///
    /// # Errors
    /// Returns [`SketchError::DriverStateError`] if not running.
    fn stop(&mut self) -> Result<()>;

    /// Returns whether the driver is currently running
    fn is_running(&self) -> bool;
}

/// A driver that only fires when [`ManualDriver::fire`] is called explicitly
///
/// This is the manually-driven mock `spec.md` §9 requires tests to use: it
/// never spawns a thread or touches the wall clock, so decay cadence can be
/// simulated by calling `fire()` as many times as real time would have
/// ticked the callback.
#[derive(Default)]
pub struct ManualDriver {
    scheduled: Option<(Duration, Box<dyn FnMut() + Send + 'static>)>,
    running: bool,
}

impl ManualDriver {
    /// Creates a driver with nothing scheduled yet
    pub fn new() -> Self {
        Self {
            scheduled: None,
            running: false,
        }
    }

    /// Invokes the scheduled callback once
    ///
    /// # Errors
    /// Returns [`SketchError::DriverStateError`] if not running, or if
    /// nothing has been scheduled.
    pub fn fire(&mut self) -> Result<()> {
        if !self.running {
            return Err(SketchError::DriverStateError {
                reason: "fire called while driver is stopped".to_string(),
            });
        }
        match &mut self.scheduled {
            Some((_, callback)) => {
                callback();
                Ok(())
            }
            None => Err(SketchError::DriverStateError {
                reason: "fire called with nothing scheduled".to_string(),
            }),
        }
    }

    /// Invokes the scheduled callback `n` times in a row
    pub fn fire_n(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.fire()?;
        }
        Ok(())
    }

    /// The interval last passed to [`PeriodicDriver::schedule`], if any
    pub fn interval(&self) -> Option<Duration> {
        self.scheduled.as_ref().map(|(interval, _)| *interval)
    }
}

impl PeriodicDriver for ManualDriver {
    fn schedule(&mut self, interval: Duration, callback: Box<dyn FnMut() + Send + 'static>) {
        self.scheduled = Some((interval, callback));
    }

    fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(SketchError::DriverStateError {
                reason: "start called on an already-running driver".to_string(),
            });
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(SketchError::DriverStateError {
                reason: "stop called on an already-stopped driver".to_string(),
            });
        }
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// A driver backed by a dedicated background thread
///
/// Widens `spec.md` §5's single-executor assumption: the scheduled callback
/// runs on its own `std::thread`, so the data it mutates must be safe to
/// touch concurrently with whatever thread owns the filter's public API
/// (the filters in this crate achieve this by locking an internal mutex
/// inside the callback they hand to `schedule`).
pub struct ThreadDriver {
    scheduled: Option<(Duration, Box<dyn FnMut() + Send + 'static>)>,
    handle: Option<thread::JoinHandle<()>>,
    stop_tx: Option<mpsc::Sender<()>>,
    running: Arc<AtomicBool>,
}

impl ThreadDriver {
    /// Creates a driver with nothing scheduled yet
    pub fn new() -> Self {
        Self {
            scheduled: None,
            handle: None,
            stop_tx: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for ThreadDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PeriodicDriver for ThreadDriver {
    fn schedule(&mut self, interval: Duration, callback: Box<dyn FnMut() + Send + 'static>) {
        self.scheduled = Some((interval, callback));
    }

    fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SketchError::DriverStateError {
                reason: "start called on an already-running driver".to_string(),
            });
        }
        let (interval, mut callback) = self.scheduled.take().ok_or_else(|| {
            SketchError::DriverStateError {
                reason: "start called with nothing scheduled".to_string(),
            }
        })?;

        let (stop_tx, stop_rx) = mpsc::channel();
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);

        let handle = thread::spawn(move || {
            while stop_rx.recv_timeout(interval).is_err() {
                callback();
            }
            running.store(false, Ordering::SeqCst);
        });

        self.handle = Some(handle);
        self.stop_tx = Some(stop_tx);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SketchError::DriverStateError {
                reason: "stop called on an already-stopped driver".to_string(),
            });
        }
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
