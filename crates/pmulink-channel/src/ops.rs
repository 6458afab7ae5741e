//! Typed PMU operations on top of the raw channel methods.

use bytes::Bytes;
use pmulink_frame::{
    BootReason, DateTime, LedSetup, PmuCommand, StartupTime, WatchdogTimeouts, WirePayload,
};
use tracing::{info, warn};

use crate::channel::Channel;
use crate::error::Result;
use crate::request::Request;

/// Reply buffer size for version strings.
pub const VERSION_CAPACITY: usize = 64;

/// Versions read during [`Channel::probe`]. A query that failed is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    pub hardware_version: Option<String>,
    pub firmware_version: Option<String>,
}

impl Channel {
    /// Keep-alive for the running watchdog. Not acknowledged.
    pub fn heartbeat(&self) -> Result<()> {
        self.send(PmuCommand::Heartbeat, Bytes::new()).map(|_| ())
    }

    pub fn hardware_version(&self) -> Result<String> {
        self.read_string(PmuCommand::HwVersionGet, VERSION_CAPACITY)
    }

    pub fn firmware_version(&self) -> Result<String> {
        self.read_string(PmuCommand::FwVersionGet, VERSION_CAPACITY)
    }

    pub fn set_watchdog(&self, timeouts: WatchdogTimeouts) -> Result<()> {
        self.write_data(PmuCommand::WatchdogTimeoutSet, timeouts.to_bytes())
    }

    /// Keep the boot and shutdown guards, stop the running watchdog.
    pub fn disable_watchdog(&self) -> Result<()> {
        self.set_watchdog(WatchdogTimeouts::disabled())
    }

    /// Set the PMU clock.
    pub fn sync_date_time(&self, time: DateTime) -> Result<()> {
        self.write_data(PmuCommand::DateTimeSync, time.to_bytes())
    }

    pub fn set_startup_time(&self, startup: StartupTime) -> Result<()> {
        self.write_data(PmuCommand::ScheduleStartupTimeSet, startup.to_bytes())
    }

    pub fn set_net_led(&self, setup: LedSetup) -> Result<()> {
        self.write_data(PmuCommand::NetStatusLedSetup, setup.to_bytes())
    }

    /// Tell the PMU the host is going down so it cuts power afterwards.
    pub fn request_host_shutdown(&self) -> Result<()> {
        self.write_data(PmuCommand::HostRequestShutdown, Bytes::new())
    }

    pub fn set_charger_auto_start(&self, enabled: bool) -> Result<()> {
        self.write_u8(PmuCommand::ChargerOnAutoStart, u8::from(enabled))
    }

    /// Ask what powered the board on.
    pub fn boot_reason(&self) -> Result<BootReason> {
        let reply = self.execute(Request::new(PmuCommand::PowerOnEventGet))?;
        Ok(reply
            .payload()
            .first()
            .copied()
            .map_or(BootReason::Unknown(0xFF), BootReason::from))
    }

    /// Bring-up sequence: stop the running watchdog, then read both version
    /// strings. Failures are logged and skipped.
    pub fn probe(&self) -> ProbeInfo {
        if let Err(err) = self.disable_watchdog() {
            warn!(error = %err, "failed to disable watchdog");
        }

        let hardware_version = self
            .hardware_version()
            .inspect_err(|err| warn!(error = %err, "failed to read hardware version"))
            .ok();
        let firmware_version = self
            .firmware_version()
            .inspect_err(|err| warn!(error = %err, "failed to read firmware version"))
            .ok();

        info!(
            hardware = hardware_version.as_deref().unwrap_or("?"),
            firmware = firmware_version.as_deref().unwrap_or("?"),
            "PMU probed"
        );
        ProbeInfo {
            hardware_version,
            firmware_version,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use pmulink_frame::{Endpoint, Frame};
    use pmulink_transport::LinkStream;

    use super::*;
    use crate::config::ChannelConfig;
    use crate::link::Link;
    use crate::notify::Disposition;

    type Seen = Arc<Mutex<Vec<Frame>>>;

    /// Host and PMU links over a socket pair. The PMU records every request
    /// and lets `answer` reply to some of them; the rest are auto-acked.
    fn pair(
        answer: impl Fn(&Arc<crate::Channel>, &Frame) -> bool + Send + Sync + 'static,
    ) -> (Link, Link, Seen, impl Send + Sync) {
        let (host_end, pmu_end) = UnixStream::pair().expect("socket pair should open");
        let config = ChannelConfig {
            reply_timeout: Duration::from_millis(200),
            max_retries: 1,
            ..ChannelConfig::default()
        };
        let host = Link::from_stream(LinkStream::from_unix(host_end), config)
            .expect("host link should start");
        let pmu = Link::from_stream(
            LinkStream::from_unix(pmu_end),
            ChannelConfig::for_endpoint(Endpoint::Pmu),
        )
        .expect("pmu link should start");

        let seen: Seen = Arc::default();
        let record = Arc::clone(&seen);
        let channel = Arc::clone(pmu.channel());
        let listener = Arc::new(move |_event: u16, frame: &Frame| {
            record
                .lock()
                .expect("seen lock should not be poisoned")
                .push(frame.clone());
            if answer(&channel, frame) {
                Disposition::Handled
            } else {
                Disposition::NotHandled
            }
        });
        pmu.register(&listener);
        (host, pmu, seen, listener)
    }

    fn payloads(seen: &Seen, command: PmuCommand) -> Vec<Bytes> {
        seen.lock()
            .expect("seen lock should not be poisoned")
            .iter()
            .filter(|frame| frame.command == command.code())
            .map(|frame| frame.payload.clone())
            .collect()
    }

    #[test]
    fn startup_time_and_charger_flag_are_encoded() {
        let (host, pmu, seen, _listener) = pair(|_, _| false);

        let startup = StartupTime::daily(7, 30, 0);
        host.set_startup_time(startup)
            .expect("startup time should be acked");
        host.set_charger_auto_start(true)
            .expect("charger flag should be acked");

        let sent = payloads(&seen, PmuCommand::ScheduleStartupTimeSet);
        assert_eq!(sent.len(), 1);
        assert_eq!(
            StartupTime::decode(&sent[0]).expect("payload should decode"),
            startup
        );
        assert_eq!(
            payloads(&seen, PmuCommand::ChargerOnAutoStart),
            vec![Bytes::from_static(&[1])]
        );

        host.close().expect("host should close");
        pmu.close().expect("pmu should close");
    }

    #[test]
    fn probe_disables_watchdog_then_reads_versions() {
        let (host, pmu, seen, _listener) = pair(|channel, frame| {
            let version: &[u8] = match PmuCommand::try_from(frame.command) {
                Ok(PmuCommand::HwVersionGet) => b"PCAT2\0",
                Ok(PmuCommand::FwVersionGet) => b"1.4.2\0",
                _ => return false,
            };
            channel
                .respond(frame, Bytes::copy_from_slice(version))
                .expect("reply should send");
            true
        });

        let info = host.probe();
        assert_eq!(info.hardware_version.as_deref(), Some("PCAT2"));
        assert_eq!(info.firmware_version.as_deref(), Some("1.4.2"));

        let watchdog = payloads(&seen, PmuCommand::WatchdogTimeoutSet);
        assert_eq!(
            WatchdogTimeouts::decode(&watchdog[0]).expect("payload should decode"),
            WatchdogTimeouts::disabled()
        );
        let order: Vec<u16> = seen
            .lock()
            .expect("seen lock should not be poisoned")
            .iter()
            .map(|frame| frame.command)
            .collect();
        assert_eq!(
            order,
            vec![
                PmuCommand::WatchdogTimeoutSet.code(),
                PmuCommand::HwVersionGet.code(),
                PmuCommand::FwVersionGet.code(),
            ]
        );

        host.close().expect("host should close");
        pmu.close().expect("pmu should close");
    }

    #[test]
    fn boot_reason_of_empty_reply_is_unknown() {
        // The auto-ack carries no payload.
        let (host, pmu, _seen, _listener) = pair(|_, _| false);
        assert_eq!(
            host.boot_reason().expect("event query should be acked"),
            BootReason::Unknown(0xFF)
        );
        assert_eq!(host.listener_count(), 0);
        assert_eq!(pmu.listener_count(), 1);

        host.close().expect("host should close");
        pmu.close().expect("pmu should close");
    }

    #[test]
    fn heartbeat_is_not_acknowledged() {
        let (host, pmu, seen, _listener) = pair(|_, _| false);
        host.heartbeat().expect("heartbeat should send");

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while payloads(&seen, PmuCommand::Heartbeat).is_empty() {
            assert!(std::time::Instant::now() < deadline, "heartbeat not seen");
            std::thread::sleep(Duration::from_millis(5));
        }
        let frame = seen.lock().expect("seen lock should not be poisoned")[0].clone();
        assert!(!frame.need_ack);

        host.close().expect("host should close");
        pmu.close().expect("pmu should close");
    }
}
