//! A PMU stand-in on a Unix socket.
//!
//! Each connection gets its own PMU-side channel. Version and power-on queries
//! are answered, every other request is acknowledged by the channel, and a
//! status report is broadcast on a fixed interval.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pmulink_channel::{Channel, ChannelConfig, Disposition, Link, Listener};
use pmulink_frame::{
    DateTime, Endpoint, Frame, PmuCommand, StatusReport, WatchdogTimeouts,
    WirePayload, HOST_BROADCAST,
};
use pmulink_transport::{LinkStream, UnixDomainSocket};
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, EmulateArgs};
use crate::exit::{channel_error, transport_error, CliResult, SUCCESS};
use crate::output::host_date_time;

const HARDWARE_VERSION: &str = "PCAT2-EMU";
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy)]
struct Telemetry {
    battery_millivolt: u16,
    temperature_celsius: i16,
}

impl Telemetry {
    fn report(&self, time: DateTime) -> StatusReport {
        let raw = self
            .temperature_celsius
            .saturating_add(StatusReport::TEMPERATURE_OFFSET);
        StatusReport {
            battery_millivolt: self.battery_millivolt,
            charger_millivolt: 5000,
            time,
            temperature_raw: raw.clamp(0, i16::from(u8::MAX)) as u8,
            ..StatusReport::default()
        }
    }
}

struct Emulator {
    channel: Arc<Channel>,
    next_report_id: AtomicU16,
}

impl Emulator {
    fn new(channel: Arc<Channel>) -> Self {
        Self {
            channel,
            next_report_id: AtomicU16::new(0x8000),
        }
    }

    fn broadcast_status(&self, telemetry: Telemetry) -> pmulink_channel::Result<()> {
        // Reports carry the host clock; synced values are only logged.
        let time = host_date_time();
        let frame_id = self.next_report_id.fetch_add(1, Ordering::Relaxed);
        let mut frame = Frame::new(
            Endpoint::Pmu,
            frame_id,
            PmuCommand::StatusReport.code(),
            true,
            telemetry.report(time).to_bytes(),
        );
        frame.dest = HOST_BROADCAST;
        self.channel.send_frame(&frame)
    }

    fn answer(&self, frame: &Frame, payload: Vec<u8>) -> Disposition {
        match self.channel.respond(frame, payload) {
            Ok(()) => Disposition::Handled,
            Err(err) => {
                warn!(error = %err, "failed to answer request");
                // The channel will fall back to an empty ack.
                Disposition::NotHandled
            }
        }
    }
}

impl Listener for Emulator {
    fn on_frame(&self, event: u16, frame: &Frame) -> Disposition {
        let Ok(command) = PmuCommand::try_from(event) else {
            debug!(command = event, "unknown command");
            return Disposition::NotHandled;
        };

        match command {
            PmuCommand::HwVersionGet => {
                let mut version = HARDWARE_VERSION.as_bytes().to_vec();
                version.push(0);
                self.answer(frame, version)
            }
            PmuCommand::FwVersionGet => {
                let mut version = env!("CARGO_PKG_VERSION").as_bytes().to_vec();
                version.push(0);
                self.answer(frame, version)
            }
            // Always reports a power-button start.
            PmuCommand::PowerOnEventGet => self.answer(frame, vec![0x00]),
            PmuCommand::DateTimeSync => {
                match DateTime::decode(&frame.payload) {
                    Ok(time) => info!(%time, "clock set"),
                    Err(err) => warn!(error = %err, "malformed clock payload"),
                }
                Disposition::NotHandled
            }
            PmuCommand::WatchdogTimeoutSet => {
                match WatchdogTimeouts::decode(&frame.payload) {
                    Ok(timeouts) => info!(
                        running = timeouts.running_timeout,
                        "watchdog configured"
                    ),
                    Err(err) => warn!(error = %err, "malformed watchdog payload"),
                }
                Disposition::NotHandled
            }
            other => {
                debug!(command = other.name(), frame_id = frame.frame_id, "request");
                Disposition::NotHandled
            }
        }
    }
}

pub fn run(args: EmulateArgs) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let telemetry = Telemetry {
        battery_millivolt: args.battery_mv,
        temperature_celsius: args.temperature,
    };

    let socket = UnixDomainSocket::bind(&args.path)
        .map_err(|err| transport_error("failed to bind emulator socket", err))?;

    // A blocking accept only returns on a new connection, so the handler
    // makes one.
    let wake_path: PathBuf = socket.path().to_path_buf();
    let running = install_ctrlc_handler(move || {
        let _ = UnixDomainSocket::connect(&wake_path);
    })?;

    info!(path = %args.path.display(), "PMU emulator ready");

    let mut sessions = Vec::new();
    while running.load(Ordering::SeqCst) {
        let stream = match socket.accept() {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "accept failed");
                thread::sleep(STOP_POLL);
                continue;
            }
        };
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let running = Arc::clone(&running);
        let session = thread::Builder::new()
            .name("pmulink-emu".to_string())
            .spawn(move || {
                if let Err(err) = serve(stream, interval, telemetry, &running) {
                    warn!(error = %err, "session ended with error");
                }
            });
        match session {
            Ok(handle) => sessions.push(handle),
            Err(err) => warn!(error = %err, "failed to start session"),
        }
        sessions.retain(|handle| !handle.is_finished());
    }

    info!("PMU emulator stopping");
    for session in sessions {
        let _ = session.join();
    }
    Ok(SUCCESS)
}

fn serve(
    stream: LinkStream,
    interval: Duration,
    telemetry: Telemetry,
    running: &AtomicBool,
) -> CliResult<()> {
    let link = Link::from_stream(stream, ChannelConfig::for_endpoint(Endpoint::Pmu))
        .map_err(|err| channel_error("emulator session failed", err))?;
    let emulator = Arc::new(Emulator::new(Arc::clone(link.channel())));
    link.register(&emulator);
    debug!("host connected");

    let mut next_report = Instant::now();
    while running.load(Ordering::SeqCst) && !link.is_closed() {
        if Instant::now() >= next_report {
            if let Err(err) = emulator.broadcast_status(telemetry) {
                debug!(error = %err, "status broadcast failed");
                break;
            }
            next_report += interval;
        }
        thread::sleep(STOP_POLL.min(interval));
    }

    debug!("host disconnected");
    link.close()
        .map_err(|err| channel_error("emulator session failed", err))
}
