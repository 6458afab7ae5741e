use pmulink_frame::BootReason;
use serde::Serialize;

use crate::cmd::InfoArgs;
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

#[derive(Serialize)]
struct InfoOutput {
    path: String,
    hardware_version: String,
    firmware_version: String,
    boot_reason: Option<&'static str>,
}

impl Record for InfoOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("device", self.path.clone()),
            ("hardware", self.hardware_version.clone()),
            ("firmware", self.firmware_version.clone()),
            ("boot reason", self.boot_reason.unwrap_or("-").to_string()),
        ]
    }
}

fn boot_reason_name(reason: BootReason) -> &'static str {
    match reason {
        BootReason::Button => "button",
        BootReason::Alarm => "alarm",
        BootReason::CarMode => "car-mode",
        BootReason::LowCharge => "low-charge",
        BootReason::Unknown(_) => "unknown",
    }
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let link = args.link.open()?;

    let hardware_version = link
        .hardware_version()
        .map_err(|err| channel_error("info failed", err))?;
    let firmware_version = link
        .firmware_version()
        .map_err(|err| channel_error("info failed", err))?;
    // Older firmware does not answer the power-on event query.
    let boot_reason = link.boot_reason().ok().map(boot_reason_name);

    let out = InfoOutput {
        path: args.link.path.display().to_string(),
        hardware_version,
        firmware_version,
        boot_reason,
    };
    print_record(&out, format);

    let _ = link.close();
    Ok(SUCCESS)
}
