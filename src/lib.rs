// Public modules
pub mod config;
pub mod controller;
pub mod device;
pub mod logging;
pub mod sample_window;
pub mod shutdown;

// Re-export constants commonly used
pub mod constants {
    pub const DEFAULT_FREQ_STEP_MHZ: u32 = 5;
    pub const DEFAULT_MIN_FREQ_MHZ: u32 = 525;
    pub const DEFAULT_MAX_FREQ_MHZ: u32 = 650;
    pub const DEFAULT_SAMPLE_WINDOW: usize = 15;
    pub const DEFAULT_MONITOR_INTERVAL_SECS: f64 = 1.0;
    pub const DEFAULT_REFRESH_INTERVAL_SECS: f64 = 10.0;
    pub const DEFAULT_TEMP_TOLERANCE: f64 = 0.5;

    pub const HTTP_TIMEOUT_SECS: u64 = 10;
    pub const RESTORE_MAX_ATTEMPTS: u32 = 61;
    pub const RESTORE_RETRY_DELAY_SECS: u64 = 1;

    pub const CONFIG_ENV: &str = "BITAXE_THERMOSTAT_CONFIG";
    pub const CONFIG_DIR_NAME: &str = "bitaxe-thermostat";
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}
