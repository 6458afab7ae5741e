use std::fmt::Write as _;
use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pmulink_frame::{command_name, DateTime, StatusReport};
use serde::Serialize;

use crate::exit::{CliError, CliResult};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Something a command prints: serialized as one JSON line, or shown as
/// field/value rows.
pub trait Record: Serialize {
    fn rows(&self) -> Vec<(&'static str, String)>;
}

pub fn print_record<R: Record>(record: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in record.rows() {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (field, value) in record.rows() {
                println!("{field:<18} {value}");
            }
        }
    }
}

#[derive(Serialize)]
pub struct StatusOutput {
    pub battery_mv: u16,
    pub charger_mv: u16,
    pub charger_online: bool,
    pub temperature_c: i16,
    pub gpio_input: u16,
    pub gpio_output: u16,
    pub pmu_time: String,
    pub pmu_time_valid: bool,
}

impl From<&StatusReport> for StatusOutput {
    fn from(report: &StatusReport) -> Self {
        Self {
            battery_mv: report.battery_millivolt,
            charger_mv: report.charger_millivolt,
            charger_online: report.charger_online(),
            temperature_c: report.temperature_celsius(),
            gpio_input: report.gpio_input,
            gpio_output: report.gpio_output,
            pmu_time: report.time.to_string(),
            pmu_time_valid: report.time.is_valid(),
        }
    }
}

impl Record for StatusOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("battery", format!("{} mV", self.battery_mv)),
            (
                "charger",
                format!(
                    "{} mV ({})",
                    self.charger_mv,
                    if self.charger_online { "online" } else { "offline" }
                ),
            ),
            ("temperature", format!("{} °C", self.temperature_c)),
            ("gpio in/out", format!("0x{:04X} / 0x{:04X}", self.gpio_input, self.gpio_output)),
            (
                "pmu clock",
                if self.pmu_time_valid {
                    self.pmu_time.clone()
                } else {
                    format!("{} (not set)", self.pmu_time)
                },
            ),
        ]
    }
}

/// Result of a command that only waits for an acknowledgment.
#[derive(Serialize)]
pub struct AckOutput {
    pub command: &'static str,
    pub acknowledged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AckOutput {
    pub fn new(command: u16, detail: Option<String>) -> Self {
        Self {
            command: command_name(command),
            acknowledged: true,
            detail,
        }
    }

    /// A command the PMU does not acknowledge.
    pub fn unacknowledged(command: u16) -> Self {
        Self {
            command: command_name(command),
            acknowledged: false,
            detail: Some("sent".to_string()),
        }
    }
}

impl Record for AckOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("command", self.command.to_string()),
            ("acknowledged", self.acknowledged.to_string()),
        ];
        if let Some(detail) = &self.detail {
            rows.push(("detail", detail.clone()));
        }
        rows
    }
}

/// A raw frame as printed by `send --wait`.
#[derive(Serialize)]
pub struct FrameOutput {
    pub frame_id: u16,
    pub command: u16,
    pub command_name: &'static str,
    pub payload_size: usize,
    pub payload_hex: String,
}

impl FrameOutput {
    pub fn new(frame_id: u16, command: u16, payload: &[u8]) -> Self {
        Self {
            frame_id,
            command,
            command_name: command_name(command),
            payload_size: payload.len(),
            payload_hex: to_hex(payload),
        }
    }
}

impl Record for FrameOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("frame id", self.frame_id.to_string()),
            ("command", format!("{} (0x{:02X})", self.command_name, self.command)),
            ("payload size", self.payload_size.to_string()),
            ("payload", self.payload_hex.clone()),
        ]
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse a hex string; spaces, colons and a leading `0x` are allowed.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let trimmed = input.trim();
    let digits: String = trimmed
        .strip_prefix("0x")
        .unwrap_or(trimmed)
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '_'))
        .collect();

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CliError::usage(format!("invalid hex payload: {input}")));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::usage(format!("odd number of hex digits: {input}")));
    }

    (0..digits.len())
        .step_by(2)
        .map(|index| {
            u8::from_str_radix(&digits[index..index + 2], 16)
                .map_err(|_| CliError::usage(format!("invalid hex payload: {input}")))
        })
        .collect()
}

/// Host wall clock as a PMU date/time (UTC).
pub fn host_date_time() -> DateTime {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    DateTime::from_unix_seconds(secs)
}
