use std::time::Instant;

use thiserror::Error;

use crate::config::{Config, ConfigStore};
use crate::device::Device;
use crate::sample_window::SampleWindow;
use crate::shutdown::CancelToken;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("decision window closed without any temperature sample")]
    EmptyWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Raise(u32),
    Lower(u32),
    Hold,
}

impl Adjustment {
    pub fn proposed(&self) -> Option<u32> {
        match *self {
            Adjustment::Raise(freq) | Adjustment::Lower(freq) => Some(freq),
            Adjustment::Hold => None,
        }
    }
}

/// Step policy with hysteresis.
///
/// A frequency outside `[min_frequency, max_frequency]` is always pushed
/// back toward the range, whatever the temperature says. Inside it, the
/// frequency moves one step along the temperature error once the error
/// leaves the tolerance band.
pub fn decide(current: u32, average: f64, target: f64, config: &Config) -> Adjustment {
    let error = target - average;
    let tolerance = config.temp_tolerance;

    if current < config.min_frequency || (error > tolerance && current < config.max_frequency) {
        Adjustment::Raise(current.saturating_add(config.frequency_step))
    } else if current > config.max_frequency
        || (error < -tolerance && current > config.min_frequency)
    {
        Adjustment::Lower(current.saturating_sub(config.frequency_step))
    } else {
        Adjustment::Hold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    // MHz, last confirmed value
    pub current_frequency: u32,
    pub samples_since_decision: usize,
    pub consecutive_read_errors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyChange {
    Applied { from: u32, to: u32 },
    Failed { attempted: u32 },
}

/// Outcome of one closed decision window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub average: f64,
    pub adjustment: Adjustment,
    pub change: Option<FrequencyChange>,
    pub read_errors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    Cancelled,
    ReadFailed,
    Sampled { temperature: f64 },
    Decided(Decision),
}

/// Closed loop keeping the averaged temperature near `target`
pub struct ThermalController<D: Device> {
    device: D,
    target: f64,
    store: ConfigStore,
    active: Config,
    last_refresh: Instant,
    window: SampleWindow,
    state: ControlState,
}

impl<D: Device> ThermalController<D> {
    pub fn new(device: D, store: ConfigStore, target: f64, starting_frequency: u32) -> Self {
        let active = store.current();
        Self {
            device,
            target,
            store,
            active,
            last_refresh: Instant::now(),
            window: SampleWindow::new(active.sample_window),
            state: ControlState {
                current_frequency: starting_frequency,
                samples_since_decision: 0,
                consecutive_read_errors: 0,
            },
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    pub fn config(&self) -> Config {
        self.active
    }

    /// Ticks until `cancel` fires or a tick fails
    pub fn run(&mut self, cancel: &mut CancelToken) -> Result<(), ControllerError> {
        loop {
            if let Tick::Cancelled = self.tick(cancel)? {
                tracing::info!("stop requested");
                return Ok(());
            }
        }
    }

    pub fn tick(&mut self, cancel: &mut CancelToken) -> Result<Tick, ControllerError> {
        if cancel.is_cancelled() {
            return Ok(Tick::Cancelled);
        }
        self.refresh_config();

        if cancel.sleep(self.active.monitor_interval()) {
            return Ok(Tick::Cancelled);
        }

        let status = match self.device.read_status() {
            Ok(status) => status,
            Err(e) => {
                // Missed readings leave the window and the cadence alone
                self.state.consecutive_read_errors += 1;
                tracing::debug!("status read failed: {e}");
                return Ok(Tick::ReadFailed);
            }
        };
        let temperature = status.temperature;
        self.window.push(temperature);
        self.state.samples_since_decision += 1;
        tracing::trace!(temperature, frequency = status.frequency, "sampled");

        if self.state.samples_since_decision < self.active.sample_window {
            return Ok(Tick::Sampled { temperature });
        }

        // A stop that arrived during the read wins over the pending decision
        if cancel.is_cancelled() {
            return Ok(Tick::Cancelled);
        }
        self.state.samples_since_decision = 0;
        self.evaluate().map(Tick::Decided)
    }

    fn refresh_config(&mut self) {
        let (config, refreshed_at) = self.store.maybe_refresh(self.last_refresh);
        self.last_refresh = refreshed_at;
        if config != self.active {
            tracing::info!(
                "configuration reloaded: step {} MHz, range [{}, {}] MHz, window {}, \
                interval {}s, tolerance {}",
                config.frequency_step,
                config.min_frequency,
                config.max_frequency,
                config.sample_window,
                config.monitor_interval,
                config.temp_tolerance
            );
            self.active = config;
        }
        self.window.set_capacity(self.active.sample_window);
    }

    fn evaluate(&mut self) -> Result<Decision, ControllerError> {
        let average = self.window.mean().ok_or(ControllerError::EmptyWindow)?;
        let current = self.state.current_frequency;
        let adjustment = decide(current, average, self.target, &self.active);

        let change = adjustment.proposed().map(|freq| {
            match self.device.apply_frequency(freq) {
                Ok(()) => {
                    self.state.current_frequency = freq;
                    tracing::info!(
                        "changed frequency {current} -> {freq} MHz (avg {average:.2}°C, target {})",
                        self.target
                    );
                    FrequencyChange::Applied {
                        from: current,
                        to: freq,
                    }
                }
                Err(e) => {
                    tracing::warn!("tried setting {freq} MHz but failed: {e}");
                    FrequencyChange::Failed { attempted: freq }
                }
            }
        });

        let read_errors = self.state.consecutive_read_errors;
        if read_errors > 0 {
            tracing::warn!("unable to fetch system info x{read_errors}");
            self.state.consecutive_read_errors = 0;
        }

        Ok(Decision {
            average,
            adjustment,
            change,
            read_errors,
        })
    }
}
