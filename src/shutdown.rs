use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use watch::{WatchReceiver, WatchSender};

use crate::constants::{RESTORE_MAX_ATTEMPTS, RESTORE_RETRY_DELAY_SECS};
use crate::device::Device;

/// Creates a linked cancellation handle and token
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (send, recv) = watch::channel(false);
    (
        CancelHandle { send },
        CancelToken {
            recv,
            cancelled: false,
        },
    )
}

/// Write side, handed to the signal handler
pub struct CancelHandle {
    send: WatchSender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.send.send(true);
    }
}

/// Routes SIGINT, SIGTERM and SIGHUP to `handle`. The handler only
/// publishes the request; the control loop does the rest.
pub fn install_signal_handler(handle: CancelHandle) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || handle.cancel())
}

/// Read side, polled by the control loop
pub struct CancelToken {
    recv: WatchReceiver<bool>,
    cancelled: bool,
}

impl CancelToken {
    pub fn is_cancelled(&mut self) -> bool {
        if let Some(value) = self.recv.get_if_new() {
            self.cancelled |= value;
        }
        self.cancelled
    }

    /// Sleeps for `duration` unless cancelled first.
    /// Returns whether cancellation was observed.
    pub fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let deadline = Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.is_cancelled();
            }
            if let Some(value) = self.recv.wait_timeout(remaining) {
                self.cancelled |= value;
                if self.cancelled {
                    return true;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorePolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self {
            max_attempts: RESTORE_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(RESTORE_RETRY_DELAY_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { attempts: u32 },
    GaveUp { attempts: u32 },
}

impl RestoreOutcome {
    pub fn attempts(&self) -> u32 {
        match *self {
            RestoreOutcome::Restored { attempts } | RestoreOutcome::GaveUp { attempts } => attempts,
        }
    }

    pub fn is_restored(&self) -> bool {
        matches!(self, RestoreOutcome::Restored { .. })
    }
}

pub fn pluralize_attempts(attempts: u32) -> String {
    if attempts == 1 {
        "1 attempt".to_string()
    } else {
        format!("{attempts} attempts")
    }
}

/// Puts the original frequency back when the controller is done,
/// whichever way it ends. Dropping the guard restores too, which
/// covers early returns and panics.
pub struct ShutdownGuard<D: Device> {
    device: D,
    original_frequency: u32,
    policy: RestorePolicy,
    restored: AtomicBool,
}

impl<D: Device> ShutdownGuard<D> {
    pub fn new(device: D, original_frequency: u32) -> Self {
        Self {
            device,
            original_frequency,
            policy: RestorePolicy::default(),
            restored: AtomicBool::new(false),
        }
    }

    pub fn with_policy(mut self, policy: RestorePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs the restoration sequence. Only the first call does anything;
    /// later calls return `None`.
    pub fn restore(&self) -> Option<RestoreOutcome> {
        if self
            .restored
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let freq = self.original_frequency;
        tracing::info!("restoring original settings");
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;
        let outcome = loop {
            if attempts > 0 {
                tracing::info!("retrying...");
            }
            attempts += 1;
            match self.device.apply_frequency(freq) {
                Ok(()) => break RestoreOutcome::Restored { attempts },
                Err(e) => {
                    tracing::debug!("restore attempt {attempts} failed: {e}");
                    if attempts >= max_attempts {
                        break RestoreOutcome::GaveUp { attempts };
                    }
                    std::thread::sleep(self.policy.retry_delay);
                }
            }
        };

        match outcome {
            RestoreOutcome::Restored { attempts } => tracing::info!(
                "changed to original frequency ({freq}) in {}",
                pluralize_attempts(attempts)
            ),
            RestoreOutcome::GaveUp { attempts } => tracing::error!(
                "unable to change to original frequency ({freq}) in {}",
                pluralize_attempts(attempts)
            ),
        }
        Some(outcome)
    }
}

impl<D: Device> Drop for ShutdownGuard<D> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Runs the control loop in `body`, then restores through `guard` no
/// matter how the loop ended. The outcome is `None` only when `guard`
/// had already restored.
pub fn run_guarded<D, E>(
    guard: &ShutdownGuard<D>,
    body: impl FnOnce() -> Result<(), E>,
) -> (Result<(), E>, Option<RestoreOutcome>)
where
    D: Device,
    E: std::fmt::Display,
{
    let result = body();
    if let Err(e) = &result {
        tracing::error!("control loop failed: {e}");
    }
    (result, guard.restore())
}
