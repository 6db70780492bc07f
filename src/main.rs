use std::io::Error as IoError;
use std::process::ExitCode;

use bitaxe_thermostat::{
    config::ConfigStore,
    controller::ThermalController,
    device::{Device, DeviceClient},
    logging,
    shutdown::{self, ShutdownGuard},
};
use clap::Parser;

/// Keeps the temperature of a Bitaxe at a target by stepping its frequency up or down
#[derive(Parser, Debug)]
#[command(name = "bitaxe-thermostat")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    BITAXE_THERMOSTAT_CONFIG    Config file path (default: <config dir>/bitaxe-thermostat/config.toml)
    BITAXE_THERMOSTAT_LOG       Log filter (default: info)
"#)]
struct Cli {
    /// IP or hostname of the Bitaxe
    address: String,
    /// Target temperature in °C
    #[arg(allow_negative_numbers = true)]
    target: i32,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init()?;

    let device = DeviceClient::new(&cli.address)?;
    let store = ConfigStore::open(ConfigStore::default_path());
    let config = store.current();
    tracing::info!(
        "target {}°C, config {}: step {} MHz, range [{}, {}] MHz, window {}, interval {}s, tolerance {}",
        cli.target,
        store.path().display(),
        config.frequency_step,
        config.min_frequency,
        config.max_frequency,
        config.sample_window,
        config.monitor_interval,
        config.temp_tolerance
    );

    let original = device.read_status().map_err(|e| {
        IoError::other(format!("unable to fetch first system info: {e}"))
    })?;
    tracing::info!("first frequency {}", original.frequency);

    let (cancel_handle, mut cancel) = shutdown::cancellation();
    shutdown::install_signal_handler(cancel_handle)?;

    let guard = ShutdownGuard::new(&device, original.frequency);
    let mut controller =
        ThermalController::new(&device, store, f64::from(cli.target), original.frequency);

    let (loop_result, outcome) =
        shutdown::run_guarded(&guard, || controller.run(&mut cancel));
    if let Some(outcome) = outcome {
        tracing::debug!("restoration finished after {} tries", outcome.attempts());
    }

    let restored = outcome.is_none_or(|outcome| outcome.is_restored());
    if loop_result.is_ok() && restored {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
