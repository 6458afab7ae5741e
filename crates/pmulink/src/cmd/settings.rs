//! Commands that write one setting and wait for the acknowledgment, plus the
//! unacknowledged heartbeat.

use pmulink_channel::{Link, Result as ChannelResult};
use pmulink_frame::{DateTime, LedSetup, PmuCommand, WatchdogTimeouts};

use crate::cmd::{LedArgs, LedState, LinkArgs, SyncTimeArgs, WatchdogArgs};
use crate::exit::{channel_error, CliError, CliResult, SUCCESS};
use crate::output::{host_date_time, print_record, AckOutput, OutputFormat};

pub fn watchdog(args: WatchdogArgs, format: OutputFormat) -> CliResult<i32> {
    if args.seconds > u32::from(u8::MAX) {
        return Err(CliError::usage(format!(
            "watchdog timeout {}s exceeds 255s",
            args.seconds
        )));
    }
    let timeouts = if args.seconds == 0 {
        WatchdogTimeouts::disabled()
    } else {
        WatchdogTimeouts::running(args.seconds)
    };
    let detail = if args.seconds == 0 {
        "disabled".to_string()
    } else {
        format!("{}s", args.seconds)
    };
    write_setting(
        &args.link,
        PmuCommand::WatchdogTimeoutSet,
        Some(detail),
        format,
        |link| link.set_watchdog(timeouts),
    )
}

pub fn heartbeat(args: LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let link = args.open()?;
    link.heartbeat()
        .map_err(|err| channel_error("HEARTBEAT failed", err))?;
    print_record(
        &AckOutput::unacknowledged(PmuCommand::Heartbeat.code()),
        format,
    );
    let _ = link.close();
    Ok(SUCCESS)
}

pub fn led(args: LedArgs, format: OutputFormat) -> CliResult<i32> {
    let (setup, detail) = match args.state {
        LedState::On => (LedSetup::on(), "on"),
        LedState::Off => (LedSetup::off(), "off"),
    };
    write_setting(
        &args.link,
        PmuCommand::NetStatusLedSetup,
        Some(detail.to_string()),
        format,
        |link| link.set_net_led(setup),
    )
}

pub fn sync_time(args: SyncTimeArgs, format: OutputFormat) -> CliResult<i32> {
    let time = match &args.at {
        Some(at) => at
            .parse::<DateTime>()
            .map_err(|err| CliError::usage(format!("invalid --at value: {err}")))?,
        None => host_date_time(),
    };
    write_setting(
        &args.link,
        PmuCommand::DateTimeSync,
        Some(time.to_string()),
        format,
        |link| link.sync_date_time(time),
    )
}

pub fn shutdown(args: LinkArgs, format: OutputFormat) -> CliResult<i32> {
    write_setting(&args, PmuCommand::HostRequestShutdown, None, format, |link| {
        link.request_host_shutdown()
    })
}

fn write_setting(
    args: &LinkArgs,
    command: PmuCommand,
    detail: Option<String>,
    format: OutputFormat,
    write: impl FnOnce(&Link) -> ChannelResult<()>,
) -> CliResult<i32> {
    let link = args.open()?;
    write(&link).map_err(|err| channel_error(&format!("{} failed", command.name()), err))?;
    print_record(&AckOutput::new(command.code(), detail), format);
    let _ = link.close();
    Ok(SUCCESS)
}
