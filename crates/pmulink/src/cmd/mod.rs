use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use pmulink_channel::{open_with_config, ChannelConfig, Link};

use crate::exit::{channel_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

#[cfg(unix)]
pub mod emulate;
pub mod info;
pub mod monitor;
pub mod send;
pub mod settings;
pub mod status;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for the next status report and print it.
    Status(StatusArgs),
    /// Print the PMU hardware and firmware versions.
    Info(InfoArgs),
    /// Set the running watchdog timeout (0 disables it).
    Watchdog(WatchdogArgs),
    /// Send one watchdog keep-alive.
    Heartbeat(LinkArgs),
    /// Switch the network status LED.
    Led(LedArgs),
    /// Set the PMU clock.
    SyncTime(SyncTimeArgs),
    /// Tell the PMU the host is shutting down.
    Shutdown(LinkArgs),
    /// Send a raw command.
    Send(SendArgs),
    /// Print status reports and shutdown requests as they arrive.
    Monitor(MonitorArgs),
    /// Run a PMU emulator on a Unix socket.
    #[cfg(unix)]
    Emulate(EmulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Status(args) => status::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Watchdog(args) => settings::watchdog(args, format),
        Command::Heartbeat(args) => settings::heartbeat(args, format),
        Command::Led(args) => settings::led(args, format),
        Command::SyncTime(args) => settings::sync_time(args, format),
        Command::Shutdown(args) => settings::shutdown(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        #[cfg(unix)]
        Command::Emulate(args) => emulate::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// How to reach the PMU.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Serial device node or Unix socket path.
    #[arg(env = "PMULINK_DEVICE")]
    pub path: PathBuf,
    /// Reply timeout per attempt (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
    /// Resends before a request gives up.
    #[arg(long, default_value_t = 3)]
    pub retries: u32,
}

impl LinkArgs {
    pub fn open(&self) -> CliResult<Link> {
        let config = ChannelConfig {
            reply_timeout: parse_duration(&self.timeout)?,
            max_retries: self.retries,
            ..ChannelConfig::default()
        };
        open_with_config(&self.path, config).map_err(|err| {
            channel_error(&format!("failed to open {}", self.path.display()), err)
        })
    }
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// How long to wait for a status report.
    #[arg(long, default_value = "5s")]
    pub wait: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct WatchdogArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Running watchdog timeout in seconds (max 255, 0 disables).
    pub seconds: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LedState {
    On,
    Off,
}

#[derive(Args, Debug)]
pub struct LedArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    pub state: LedState,
}

#[derive(Args, Debug)]
pub struct SyncTimeArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Time to set (YYYY-MM-DDTHH:MM:SS, UTC). Default: host clock.
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Command opcode (decimal or 0x-prefixed hex).
    #[arg(long, short = 'c', value_parser = parse_opcode)]
    pub command: u16,
    /// Payload as hex bytes.
    #[arg(long, default_value = "")]
    pub hex: String,
    /// Request an ack and print the reply.
    #[arg(long)]
    pub wait: bool,
    /// Reply opcode to wait for (default: command + 1).
    #[arg(long, value_parser = parse_opcode, requires = "wait")]
    pub expect: Option<u16>,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Exit after N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[cfg(unix)]
#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Status report broadcast interval (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Battery voltage reported, in millivolts.
    #[arg(long, default_value_t = 3950)]
    pub battery_mv: u16,
    /// Board temperature reported, in degrees Celsius.
    #[arg(long, default_value_t = 25, allow_negative_numbers = true)]
    pub temperature: i16,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build details.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_opcode(input: &str) -> Result<u16, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid opcode: {input}"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Returns a flag that turns false on Ctrl-C. `on_stop` runs once, from the
/// signal thread, after the flag is cleared.
pub fn install_ctrlc_handler(
    on_stop: impl Fn() + Send + 'static,
) -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        if flag.swap(false, Ordering::SeqCst) {
            on_stop();
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}
