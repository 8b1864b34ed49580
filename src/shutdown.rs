//! Shutdown token shared by the signal thread, command loop and backoff waits.

use crate::error::{Error, Result};
use log::info;
use parking_lot::{Condvar, Mutex};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cloneable cancellation flag with an interruptible sleep
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug, Default)]
struct ShutdownInner {
    requested: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl Shutdown {
    /// Create a token in the running state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter
    pub fn trigger(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.requested.store(true, Ordering::Release);
        self.inner.wake.notify_all();
    }

    /// Check whether shutdown was requested
    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns `true` if the wait was cut short by shutdown.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut guard = self.inner.lock.lock();

        loop {
            if self.is_triggered() {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    // Spurious wakeups loop back to re-check the deadline
                    let _ = self.inner.wake.wait_until(&mut guard, deadline);
                }
                None => self.inner.wake.wait(&mut guard),
            }
        }
    }

    /// Spawn a thread that triggers this token on SIGINT or SIGTERM
    pub fn install_signal_handler(&self) -> Result<()> {
        let mut signals = Signals::new([SIGINT, SIGTERM])
            .map_err(|e| Error::Other(format!("Failed to register signal handlers: {}", e)))?;
        let shutdown = self.clone();

        std::thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!("Received signal {}, initiating shutdown...", sig);
                    shutdown.trigger();
                }
            })
            .map_err(|e| Error::Other(format!("Failed to spawn signal handler thread: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_runs_full_duration_when_idle() {
        let shutdown = Shutdown::new();
        let start = Instant::now();
        assert!(!shutdown.wait_timeout(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_trigger_interrupts_wait() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.trigger();
        });

        let start = Instant::now();
        assert!(shutdown.wait_timeout(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(10));
        handle.join().unwrap();
    }

    #[test]
    fn test_already_triggered_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        assert!(shutdown.wait_timeout(Duration::MAX));
    }
}
