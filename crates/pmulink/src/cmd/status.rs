use std::sync::Arc;

use pmulink_channel::StatusMonitor;

use crate::cmd::{parse_duration, StatusArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat, StatusOutput};

pub fn run(args: StatusArgs, format: OutputFormat) -> CliResult<i32> {
    let wait = parse_duration(&args.wait)?;
    let link = args.link.open()?;

    let monitor = Arc::new(StatusMonitor::new());
    link.register(&monitor);

    let report = monitor
        .wait_for_report(wait)
        .map_err(|err| channel_error("status failed", err))?;
    print_record(&StatusOutput::from(&report), format);

    let _ = link.close();
    Ok(SUCCESS)
}
