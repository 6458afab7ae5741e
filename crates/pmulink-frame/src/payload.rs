//! Typed payload records carried by specific commands.
//!
//! All records are packed little-endian structures with no padding.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// A fixed-size payload record.
pub trait WirePayload: Sized {
    /// Encoded size in bytes.
    const WIRE_SIZE: usize;
    /// Record name used in errors.
    const NAME: &'static str;

    /// Append the encoded record.
    fn encode(&self, dst: &mut BytesMut);

    /// Decode from the start of `src`; trailing bytes are ignored.
    fn decode(src: &[u8]) -> Result<Self>;

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::WIRE_SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }
}

fn ensure_len<T: WirePayload>(src: &[u8]) -> Result<()> {
    if src.len() < T::WIRE_SIZE {
        return Err(FrameError::TruncatedPayload {
            what: T::NAME,
            expected: T::WIRE_SIZE,
            actual: src.len(),
        });
    }
    Ok(())
}

/// Calendar date and wall-clock time as kept by the PMU clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// Whether every field is inside its calendar range.
    pub fn is_valid(&self) -> bool {
        self.second < 60
            && self.minute < 60
            && self.hour < 24
            && (1..=31).contains(&self.day)
            && (1..=12).contains(&self.month)
            && (1900..=9999).contains(&self.year)
    }

    /// Convert seconds since the Unix epoch (UTC).
    pub fn from_unix_seconds(secs: u64) -> Self {
        let days = secs / 86_400;
        let rem = secs % 86_400;

        // Civil-from-days, shifted so the era starts on March 1st.
        let z = days as i64 + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + i64::from(month <= 2);

        Self {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            hour: (rem / 3600) as u8,
            minute: (rem % 3600 / 60) as u8,
            second: (rem % 60) as u8,
        }
    }
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

impl std::str::FromStr for DateTime {
    type Err = String;

    /// Parses `YYYY-MM-DDTHH:MM:SS` (a space may replace the `T`).
    fn from_str(input: &str) -> std::result::Result<Self, Self::Err> {
        let input = input.trim();
        let (date, time) = input
            .split_once(['T', ' '])
            .ok_or_else(|| format!("expected YYYY-MM-DDTHH:MM:SS, got {input:?}"))?;

        let mut date_parts = date.split('-');
        let mut time_parts = time.split(':');
        let parsed = Self {
            year: parse_field(date_parts.next(), "year", input)?,
            month: parse_field(date_parts.next(), "month", input)?,
            day: parse_field(date_parts.next(), "day", input)?,
            hour: parse_field(time_parts.next(), "hour", input)?,
            minute: parse_field(time_parts.next(), "minute", input)?,
            second: parse_field(time_parts.next(), "second", input)?,
        };

        if date_parts.next().is_some() || time_parts.next().is_some() || !parsed.is_valid() {
            return Err(format!("date/time out of range: {input:?}"));
        }
        Ok(parsed)
    }
}

fn parse_field<T: std::str::FromStr>(
    part: Option<&str>,
    name: &str,
    input: &str,
) -> std::result::Result<T, String> {
    part.ok_or_else(|| format!("missing {name}"))?
        .parse::<T>()
        .map_err(|_| format!("invalid {name} in {input:?}"))
}

impl WirePayload for DateTime {
    const WIRE_SIZE: usize = 7;
    const NAME: &'static str = "date-time";

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16_le(self.year);
        dst.put_u8(self.month);
        dst.put_u8(self.day);
        dst.put_u8(self.hour);
        dst.put_u8(self.minute);
        dst.put_u8(self.second);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len::<Self>(src)?;
        Ok(Self {
            year: src.get_u16_le(),
            month: src.get_u8(),
            day: src.get_u8(),
            hour: src.get_u8(),
            minute: src.get_u8(),
            second: src.get_u8(),
        })
    }
}

/// Blink pattern for the network status LED, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedSetup {
    pub on_time: u16,
    pub down_time: u16,
    pub repeat: u16,
}

impl LedSetup {
    /// Steady on.
    pub const fn on() -> Self {
        Self {
            on_time: 100,
            down_time: 0,
            repeat: 0,
        }
    }

    /// Steady off.
    pub const fn off() -> Self {
        Self {
            on_time: 0,
            down_time: 100,
            repeat: 0,
        }
    }
}

impl WirePayload for LedSetup {
    const WIRE_SIZE: usize = 6;
    const NAME: &'static str = "led-setup";

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16_le(self.on_time);
        dst.put_u16_le(self.down_time);
        dst.put_u16_le(self.repeat);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len::<Self>(src)?;
        Ok(Self {
            on_time: src.get_u16_le(),
            down_time: src.get_u16_le(),
            repeat: src.get_u16_le(),
        })
    }
}

/// Scheduled power-on time. Bits of `match_mask` select which fields must
/// match: bit 0 year, 1 month, 2 day, 3 hour, 4 minute, 5 second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupTime {
    pub time: DateTime,
    pub match_mask: u8,
}

impl StartupTime {
    pub const MATCH_YEAR: u8 = 1 << 0;
    pub const MATCH_MONTH: u8 = 1 << 1;
    pub const MATCH_DAY: u8 = 1 << 2;
    pub const MATCH_HOUR: u8 = 1 << 3;
    pub const MATCH_MINUTE: u8 = 1 << 4;
    pub const MATCH_SECOND: u8 = 1 << 5;

    /// Power on every day at the given time of day.
    pub fn daily(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            time: DateTime {
                hour,
                minute,
                second,
                ..DateTime::default()
            },
            match_mask: Self::MATCH_HOUR | Self::MATCH_MINUTE | Self::MATCH_SECOND,
        }
    }
}

impl WirePayload for StartupTime {
    const WIRE_SIZE: usize = DateTime::WIRE_SIZE + 1;
    const NAME: &'static str = "startup-time";

    fn encode(&self, dst: &mut BytesMut) {
        self.time.encode(dst);
        dst.put_u8(self.match_mask);
    }

    fn decode(src: &[u8]) -> Result<Self> {
        ensure_len::<Self>(src)?;
        Ok(Self {
            time: DateTime::decode(src)?,
            match_mask: src[DateTime::WIRE_SIZE],
        })
    }
}

/// Periodic status broadcast from the PMU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Battery voltage in millivolts.
    pub battery_millivolt: u16,
    /// Charger input voltage in millivolts.
    pub charger_millivolt: u16,
    pub gpio_input: u16,
    pub gpio_output: u16,
    /// PMU clock.
    pub time: DateTime,
    pub reserved: u16,
    /// Board temperature with a +40 °C offset.
    pub temperature_raw: u8,
}

impl StatusReport {
    /// Offset applied to the raw temperature byte.
    pub const TEMPERATURE_OFFSET: i16 = 40;

    /// Board temperature in degrees Celsius.
    pub fn temperature_celsius(&self) -> i16 {
        i16::from(self.temperature_raw) - Self::TEMPERATURE_OFFSET
    }

    /// A charger is considered plugged in above 1 V.
    pub fn charger_online(&self) -> bool {
        self.charger_millivolt > 1000
    }

    /// A battery is considered present above 1 V.
    pub fn battery_present(&self) -> bool {
        self.battery_millivolt > 1000
    }
}

impl WirePayload for StatusReport {
    const WIRE_SIZE: usize = 8 + DateTime::WIRE_SIZE + 3;
    const NAME: &'static str = "status-report";

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16_le(self.battery_millivolt);
        dst.put_u16_le(self.charger_millivolt);
        dst.put_u16_le(self.gpio_input);
        dst.put_u16_le(self.gpio_output);
        self.time.encode(dst);
        dst.put_u16_le(self.reserved);
        dst.put_u8(self.temperature_raw);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len::<Self>(src)?;
        let battery_millivolt = src.get_u16_le();
        let charger_millivolt = src.get_u16_le();
        let gpio_input = src.get_u16_le();
        let gpio_output = src.get_u16_le();
        let time = DateTime::decode(src)?;
        src.advance(DateTime::WIRE_SIZE);
        Ok(Self {
            battery_millivolt,
            charger_millivolt,
            gpio_input,
            gpio_output,
            time,
            reserved: src.get_u16_le(),
            temperature_raw: src.get_u8(),
        })
    }
}

/// Watchdog timeouts in seconds. A zero running timeout disables the
/// watchdog while the host is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTimeouts {
    pub startup_timeout: u8,
    pub shutdown_timeout: u8,
    pub running_timeout: u8,
}

impl WatchdogTimeouts {
    /// Boot and shutdown guards at 60 s, running watchdog off.
    pub const fn disabled() -> Self {
        Self {
            startup_timeout: 60,
            shutdown_timeout: 60,
            running_timeout: 0,
        }
    }

    /// Default guards with the given running timeout, clamped to 255 s.
    pub fn running(seconds: u32) -> Self {
        Self {
            running_timeout: seconds.min(u32::from(u8::MAX)) as u8,
            ..Self::disabled()
        }
    }
}

impl Default for WatchdogTimeouts {
    fn default() -> Self {
        Self::disabled()
    }
}

impl WirePayload for WatchdogTimeouts {
    const WIRE_SIZE: usize = 3;
    const NAME: &'static str = "watchdog";

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.startup_timeout);
        dst.put_u8(self.shutdown_timeout);
        dst.put_u8(self.running_timeout);
    }

    fn decode(src: &[u8]) -> Result<Self> {
        ensure_len::<Self>(src)?;
        Ok(Self {
            startup_timeout: src[0],
            shutdown_timeout: src[1],
            running_timeout: src[2],
        })
    }
}

/// Why the PMU asks the host to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Button,
    PowerLow,
    Upgrade,
    Other,
    Unknown(u8),
}

impl ShutdownReason {
    /// Reason from the first payload byte; an empty payload is `Unknown(0xFF)`.
    pub fn from_payload(payload: &[u8]) -> Self {
        payload.first().copied().map_or(Self::Unknown(0xFF), Self::from)
    }

    pub fn describe(self) -> &'static str {
        match self {
            ShutdownReason::Button => "power button",
            ShutdownReason::PowerLow => "battery voltage low",
            ShutdownReason::Upgrade => "system upgrade",
            ShutdownReason::Other => "other reason",
            ShutdownReason::Unknown(_) => "(unknown)",
        }
    }
}

impl From<u8> for ShutdownReason {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ShutdownReason::Button,
            0x01 => ShutdownReason::PowerLow,
            0x02 => ShutdownReason::Upgrade,
            0x03 => ShutdownReason::Other,
            other => ShutdownReason::Unknown(other),
        }
    }
}

/// What powered the board on, as answered to `POWER_ON_EVENT_GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootReason {
    Button,
    Alarm,
    CarMode,
    /// Battery too low to run, or no battery at all; the PMU reports both
    /// with the same code.
    LowCharge,
    Unknown(u8),
}

impl From<u8> for BootReason {
    fn from(value: u8) -> Self {
        match value {
            0x00 => BootReason::Button,
            0x01 => BootReason::Alarm,
            0x02 => BootReason::CarMode,
            0x03 => BootReason::LowCharge,
            other => BootReason::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_status() -> StatusReport {
        StatusReport {
            battery_millivolt: 3987,
            charger_millivolt: 5120,
            gpio_input: 0x0003,
            gpio_output: 0x0100,
            time: DateTime {
                year: 2024,
                month: 6,
                day: 30,
                hour: 23,
                minute: 59,
                second: 58,
            },
            reserved: 0,
            temperature_raw: 65,
        }
    }

    #[test]
    fn status_report_layout() {
        let bytes = sample_status().to_bytes();
        assert_eq!(bytes.len(), StatusReport::WIRE_SIZE);
        assert_eq!(StatusReport::WIRE_SIZE, 18);
        assert_eq!(&bytes[0..2], &3987u16.to_le_bytes());
        assert_eq!(&bytes[2..4], &5120u16.to_le_bytes());
        assert_eq!(&bytes[8..10], &2024u16.to_le_bytes());
        assert_eq!(bytes[17], 65);
        assert_eq!(StatusReport::decode(&bytes).unwrap(), sample_status());
    }

    #[test]
    fn temperature_offset() {
        let status = sample_status();
        assert_eq!(status.temperature_celsius(), 25);
        let freezing = StatusReport {
            temperature_raw: 30,
            ..status
        };
        assert_eq!(freezing.temperature_celsius(), -10);
        assert!(status.charger_online());
        assert!(status.battery_present());
    }

    #[test]
    fn truncated_status_report() {
        let err = StatusReport::decode(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            FrameError::TruncatedPayload {
                what: "status-report",
                expected: 18,
                actual: 10
            }
        );
        assert!(!err.is_corrupt());
    }

    #[test]
    fn watchdog_defaults_and_clamp() {
        assert_eq!(WatchdogTimeouts::default().to_bytes().as_ref(), &[60, 60, 0]);
        assert_eq!(WatchdogTimeouts::running(30).running_timeout, 30);
        assert_eq!(WatchdogTimeouts::running(1000).running_timeout, 255);
    }

    #[test]
    fn led_patterns() {
        assert_eq!(LedSetup::on().to_bytes().as_ref(), &[100, 0, 0, 0, 0, 0]);
        assert_eq!(LedSetup::off().to_bytes().as_ref(), &[0, 0, 100, 0, 0, 0]);
    }

    #[test]
    fn startup_time_appends_mask() {
        let startup = StartupTime::daily(7, 30, 0);
        let bytes = startup.to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes[7], 0b0011_1000);
        assert_eq!(StartupTime::decode(&bytes).unwrap(), startup);
    }

    #[test]
    fn date_time_validation() {
        assert!(sample_status().time.is_valid());
        assert!(!DateTime::default().is_valid());
        let bad = DateTime {
            hour: 24,
            ..sample_status().time
        };
        assert!(!bad.is_valid());
    }

    #[test]
    fn date_time_from_unix_seconds() {
        assert_eq!(
            DateTime::from_unix_seconds(0).to_string(),
            "1970-01-01T00:00:00"
        );
        // 2024-02-29T12:34:56Z
        assert_eq!(
            DateTime::from_unix_seconds(1_709_210_096).to_string(),
            "2024-02-29T12:34:56"
        );
    }

    #[test]
    fn date_time_parse() {
        let parsed: DateTime = "2024-06-30T23:59:58".parse().unwrap();
        assert_eq!(parsed, sample_status().time);
        assert!("2024-13-01T00:00:00".parse::<DateTime>().is_err());
        assert!("2024-257-01T00:00:00".parse::<DateTime>().is_err());
        assert!("2024-01-01T00:00:316".parse::<DateTime>().is_err());
        assert!("yesterday".parse::<DateTime>().is_err());
    }

    #[test]
    fn shutdown_reasons() {
        assert_eq!(ShutdownReason::from_payload(&[1]), ShutdownReason::PowerLow);
        assert_eq!(
            ShutdownReason::from_payload(&[]).describe(),
            "(unknown)"
        );
        assert_eq!(ShutdownReason::from(9), ShutdownReason::Unknown(9));
        assert_eq!(BootReason::from(2), BootReason::CarMode);
    }
}
