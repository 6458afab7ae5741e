use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use pmulink_frame::{Frame, PmuCommand, ShutdownReason, StatusReport, WirePayload};
use tracing::{debug, info, warn};

use crate::error::{ChannelError, Result};
use crate::notify::{Disposition, Listener};

/// Keeps the most recent status report broadcast by the PMU.
///
/// Never claims the frame, so the broadcast is still acknowledged.
#[derive(Default)]
pub struct StatusMonitor {
    latest: Mutex<Option<StatusReport>>,
    arrived: Condvar,
    reports: AtomicU64,
}

impl StatusMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last report received, if any.
    pub fn latest(&self) -> Option<StatusReport> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of reports received so far.
    pub fn report_count(&self) -> u64 {
        self.reports.load(Ordering::Acquire)
    }

    /// Block until a report is available, at most `timeout`.
    pub fn wait_for_report(&self, timeout: Duration) -> Result<StatusReport> {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let (latest, _) = self
            .arrived
            .wait_timeout_while(latest, timeout, |latest| latest.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        (*latest).ok_or(ChannelError::NoReport(timeout))
    }

    /// Block until a report newer than the `seen`-th arrives, at most `timeout`.
    pub fn wait_for_next(&self, seen: u64, timeout: Duration) -> Result<StatusReport> {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let (latest, _) = self
            .arrived
            .wait_timeout_while(latest, timeout, |_| self.report_count() <= seen)
            .unwrap_or_else(PoisonError::into_inner);
        match *latest {
            Some(report) if self.report_count() > seen => Ok(report),
            _ => Err(ChannelError::NoReport(timeout)),
        }
    }
}

impl Listener for StatusMonitor {
    fn on_frame(&self, event: u16, frame: &Frame) -> Disposition {
        if event != PmuCommand::StatusReport.code() {
            return Disposition::NotHandled;
        }

        match StatusReport::decode(&frame.payload) {
            Ok(report) => {
                debug!(
                    battery_mv = report.battery_millivolt,
                    charger_mv = report.charger_millivolt,
                    temperature_c = report.temperature_celsius(),
                    "status report"
                );
                let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
                *latest = Some(report);
                self.reports.fetch_add(1, Ordering::AcqRel);
                self.arrived.notify_all();
            }
            Err(err) => warn!(error = %err, "ignoring malformed status report"),
        }
        Disposition::NotHandled
    }
}

type ShutdownCallback = Box<dyn Fn(ShutdownReason) + Send + Sync>;

/// Reacts to the PMU asking the host to shut down.
///
/// The request is still auto-acknowledged; the callback decides what the
/// host does about it.
pub struct ShutdownListener {
    callback: ShutdownCallback,
}

impl ShutdownListener {
    pub fn new(callback: impl Fn(ShutdownReason) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl Listener for ShutdownListener {
    fn on_frame(&self, event: u16, frame: &Frame) -> Disposition {
        if event == PmuCommand::PmuRequestShutdown.code() {
            let reason = ShutdownReason::from_payload(&frame.payload);
            info!(reason = reason.describe(), "PMU requested shutdown");
            (self.callback)(reason);
        }
        Disposition::NotHandled
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use pmulink_frame::Endpoint;

    use super::*;

    fn report_frame(temperature_raw: u8) -> Frame {
        let report = StatusReport {
            battery_millivolt: 4100,
            temperature_raw,
            ..StatusReport::default()
        };
        Frame::new(
            Endpoint::Pmu,
            1,
            PmuCommand::StatusReport.code(),
            true,
            report.to_bytes(),
        )
    }

    #[test]
    fn records_latest_report() {
        let monitor = StatusMonitor::new();
        assert!(monitor.latest().is_none());

        let frame = report_frame(65);
        assert_eq!(
            monitor.on_frame(frame.command, &frame),
            Disposition::NotHandled
        );
        let report = monitor.latest().expect("report should be recorded");
        assert_eq!(report.temperature_celsius(), 25);
        assert_eq!(monitor.report_count(), 1);
    }

    #[test]
    fn wait_times_out_without_report() {
        let monitor = StatusMonitor::new();
        let err = monitor
            .wait_for_report(Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, ChannelError::NoReport(_)));
    }

    #[test]
    fn wait_wakes_on_report() {
        let monitor = Arc::new(StatusMonitor::new());
        let feeder = Arc::clone(&monitor);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let frame = report_frame(50);
            feeder.on_frame(frame.command, &frame);
        });

        let report = monitor
            .wait_for_report(Duration::from_secs(5))
            .expect("report should arrive");
        assert_eq!(report.temperature_celsius(), 10);
        handle.join().unwrap();

        let err = monitor
            .wait_for_next(1, Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, ChannelError::NoReport(_)));
    }

    #[test]
    fn malformed_and_unrelated_frames_are_skipped() {
        let monitor = StatusMonitor::new();
        let short = Frame::new(Endpoint::Pmu, 1, 0x07, true, Bytes::from_static(&[1, 2]));
        let other = Frame::new(Endpoint::Pmu, 2, 0x0D, true, Bytes::new());
        monitor.on_frame(short.command, &short);
        monitor.on_frame(other.command, &other);
        assert_eq!(monitor.report_count(), 0);
    }

    #[test]
    fn shutdown_listener_decodes_reason() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let listener = ShutdownListener::new(move |reason| {
            *sink.lock().unwrap() = Some(reason);
        });

        let frame = Frame::new(Endpoint::Pmu, 9, 0x0D, true, Bytes::from_static(&[0x01]));
        assert_eq!(
            listener.on_frame(frame.command, &frame),
            Disposition::NotHandled
        );
        assert_eq!(*seen.lock().unwrap(), Some(ShutdownReason::PowerLow));
    }
}
