use std::sync::atomic::Ordering;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use pmulink_channel::Disposition;
use pmulink_frame::{Frame, PmuCommand, ShutdownReason, StatusReport, WirePayload};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cmd::{install_ctrlc_handler, MonitorArgs};
use crate::exit::{CliResult, FAILURE, SUCCESS};
use crate::output::{print_record, OutputFormat, Record, StatusOutput};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

enum Event {
    Status(StatusReport),
    Shutdown(ShutdownReason),
}

#[derive(Serialize)]
struct EventOutput<R> {
    event: &'static str,
    #[serde(flatten)]
    record: R,
}

impl<R: Record> Record for EventOutput<R> {
    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![("event", self.event.to_string())];
        rows.extend(self.record.rows());
        rows
    }
}

#[derive(Serialize)]
struct ShutdownOutput {
    reason: &'static str,
}

impl Record for ShutdownOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![("reason", self.reason.to_string())]
    }
}

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let running = install_ctrlc_handler(|| {})?;
    let link = args.link.open()?;

    let (tx, rx) = mpsc::channel();
    let forward = Arc::new(move |event: u16, frame: &Frame| {
        let parsed = if event == PmuCommand::StatusReport.code() {
            StatusReport::decode(&frame.payload)
                .inspect_err(|err| warn!(error = %err, "dropping malformed status report"))
                .ok()
                .map(Event::Status)
        } else if event == PmuCommand::PmuRequestShutdown.code() {
            Some(Event::Shutdown(ShutdownReason::from_payload(&frame.payload)))
        } else {
            None
        };
        if let Some(parsed) = parsed {
            let _ = tx.send(parsed);
        }
        // Leave the acknowledgment to the channel.
        Disposition::NotHandled
    });
    link.register(&forward);

    let mut seen = 0usize;
    let code = loop {
        if !running.load(Ordering::SeqCst) {
            break SUCCESS;
        }
        if args.count.is_some_and(|count| seen >= count) {
            break SUCCESS;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Event::Status(report)) => {
                let out = EventOutput {
                    event: "status",
                    record: StatusOutput::from(&report),
                };
                print_record(&out, format);
                seen += 1;
            }
            Ok(Event::Shutdown(reason)) => {
                let out = EventOutput {
                    event: "shutdown_request",
                    record: ShutdownOutput {
                        reason: reason.describe(),
                    },
                };
                print_record(&out, format);
                seen += 1;
            }
            Err(mpsc::RecvTimeoutError::Timeout) if link.is_closed() => {
                warn!("link closed by peer");
                break FAILURE;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break FAILURE,
        }
    };

    debug!(events = seen, "monitor stopped");
    let _ = link.close();
    Ok(code)
}
