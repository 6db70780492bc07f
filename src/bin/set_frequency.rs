use std::io::{Error as IoError, ErrorKind};

use bitaxe_thermostat::{
    config::ConfigStore,
    device::{Device, DeviceClient},
    logging,
};
use clap::Parser;

/// Applies a single frequency to a Bitaxe, within the configured range
#[derive(Parser, Debug)]
#[command(name = "set-frequency")]
#[command(version, about, long_about = None)]
struct Cli {
    /// IP or hostname of the Bitaxe
    address: String,
    /// Frequency in MHz
    frequency: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init()?;

    let config = ConfigStore::inspect(&ConfigStore::default_path());

    // Check if target frequency is in valid range
    if cli.frequency < config.min_frequency || cli.frequency > config.max_frequency {
        Err(IoError::new(
            ErrorKind::InvalidInput,
            format!(
                "frequency {} MHz is outside the configured range [{} - {}] MHz",
                cli.frequency, config.min_frequency, config.max_frequency
            ),
        ))?;
    }

    let device = DeviceClient::new(&cli.address)?;
    let before = device.read_status()?;
    tracing::info!(
        "current frequency {} MHz at {:.1}°C",
        before.frequency,
        before.temperature
    );

    device.apply_frequency(cli.frequency)?;

    match device.read_status() {
        Ok(after) => tracing::info!(
            "frequency set to {} MHz, device reports {} MHz",
            cli.frequency,
            after.frequency
        ),
        Err(e) => tracing::warn!(
            "frequency set to {} MHz, but reading it back failed: {e}",
            cli.frequency
        ),
    }

    Ok(())
}
