//! End-to-end connection tests over a scripted mock transport.
//!
//! The mock records every transmitted line and answers each write with
//! a scripted reply (falling back to a fixed auto-reply), so the full
//! worker loop runs against deterministic firmware behavior.

use parking_lot::Mutex;
use printkit_communication::firmware::marlin::checksum;
use printkit_communication::{ConnectionParams, LineTransport, MarlinDialect, PrinterConnection};
use printkit_communication::firmware::FirmwareDialect;
use printkit_core::{
    CommunicationState, ConnectionEvent, DeviceErrorEvent, DisconnectReason, Error, JobEvent,
    JobOutcome, PrinterEvent, ProgressReportingMode, Result, StateError, StreamEvent,
    TemperatureSource, TemperatureEvent, TransportError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::sleep;

/// Shared handles into a [`MockTransport`]
#[derive(Clone)]
struct MockLink {
    sent: Arc<Mutex<Vec<String>>>,
    inbox: Arc<Mutex<VecDeque<String>>>,
    /// Per-write scripted replies; one entry is consumed per write and
    /// may contain several lines
    replies: Arc<Mutex<VecDeque<String>>>,
    /// Reply used once the script is exhausted; `None` stays silent
    auto_reply: Option<String>,
    fail_reads: Arc<AtomicBool>,
    open: Arc<AtomicBool>,
}

impl MockLink {
    fn new(auto_reply: Option<&str>) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            inbox: Arc::new(Mutex::new(VecDeque::new())),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            auto_reply: auto_reply.map(str::to_string),
            fail_reads: Arc::new(AtomicBool::new(false)),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    fn transport(&self) -> Box<dyn LineTransport> {
        Box::new(MockTransport { link: self.clone() })
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    fn script_replies(&self, replies: &[&str]) {
        let mut queue = self.replies.lock();
        for reply in replies {
            queue.push_back(reply.to_string());
        }
    }

    /// Deliver an unsolicited line, as firmware autoreports do
    fn push_response(&self, line: &str) {
        self.inbox.lock().push_back(line.to_string());
    }

    fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }
}

struct MockTransport {
    link: MockLink,
}

impl LineTransport for MockTransport {
    fn write_line(&mut self, line: &str) -> Result<()> {
        if !self.link.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen.into());
        }
        self.link.sent.lock().push(line.to_string());

        let reply = self
            .link
            .replies
            .lock()
            .pop_front()
            .or_else(|| self.link.auto_reply.clone());
        if let Some(reply) = reply {
            let mut inbox = self.link.inbox.lock();
            for part in reply.lines() {
                inbox.push_back(part.to_string());
            }
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        if self.link.fail_reads.load(Ordering::SeqCst) {
            return Err(TransportError::ReadFailed {
                reason: "mock read failure".to_string(),
            }
            .into());
        }
        Ok(self.link.inbox.lock().pop_front())
    }

    fn is_open(&self) -> bool {
        self.link.open.load(Ordering::SeqCst)
    }

    fn close(&mut self) -> Result<()> {
        self.link.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn description(&self) -> String {
        "mock".to_string()
    }
}

fn test_params() -> ConnectionParams {
    ConnectionParams {
        port: "mock".to_string(),
        timeout_ms: 250,
        temperature_poll_secs: 0,
        ..Default::default()
    }
}

async fn wait_for(what: &str, predicate: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_for_state(connection: &PrinterConnection, want: CommunicationState) {
    wait_for(&format!("state {:?}", want), || connection.state() == want).await;
}

fn drain(events: &mut broadcast::Receiver<PrinterEvent>) -> Vec<PrinterEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test]
async fn print_flow_streams_normalized_lines_in_order() {
    let link = MockLink::new(Some("ok"));
    let connection = PrinterConnection::new(test_params());
    let mut events = connection.subscribe();

    connection.connect_with(link.transport()).await.unwrap();
    wait_for_state(&connection, CommunicationState::Connected).await;

    let content = "; header\nG28 ; home\nG1 X10 Y10 F3000\nM104 S200\n\nG1 X20\n";
    connection.start_print_text("cube.gcode", content).await.unwrap();
    wait_for_state(&connection, CommunicationState::Finished).await;

    assert_eq!(
        link.sent(),
        vec!["G28", "G1 X10 Y10 F3000", "M104 S200", "G1 X20"]
    );

    let job = connection.job().unwrap();
    assert_eq!(*job.outcome(), JobOutcome::Completed);
    assert_eq!(job.percent_done(), 100.0);

    let status = connection.status();
    assert_eq!(status.percent_complete, 100.0);
    assert_eq!(status.position.position.x, 20.0);
    assert_eq!(status.position.position.y, 10.0);
    assert_eq!(status.temperatures.hotend.target, 200.0);

    let drained = drain(&mut events);
    assert!(drained.iter().any(|e| matches!(
        e,
        PrinterEvent::Connection(ConnectionEvent::Connected { .. })
    )));
    assert!(drained
        .iter()
        .any(|e| matches!(e, PrinterEvent::Job(JobEvent::Started { .. }))));
    assert!(drained
        .iter()
        .any(|e| matches!(e, PrinterEvent::Job(JobEvent::Finished { .. }))));
}

#[tokio::test]
async fn progress_changed_events_follow_whole_percents() {
    let link = MockLink::new(Some("ok"));
    let connection = PrinterConnection::new(test_params());
    let mut events = connection.subscribe();

    connection.connect_with(link.transport()).await.unwrap();
    connection
        .start_print_text("steps.gcode", "G1 X1\nG1 X2\nG1 X3\nG1 X4\n")
        .await
        .unwrap();
    wait_for_state(&connection, CommunicationState::Finished).await;

    let percents: Vec<f64> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            PrinterEvent::Job(JobEvent::ProgressChanged { percent }) => Some(percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![25.0, 50.0, 75.0, 100.0]);
}

#[tokio::test]
async fn progress_report_lines_are_injected_on_the_wire() {
    let link = MockLink::new(Some("ok"));
    let connection = PrinterConnection::new(test_params());
    connection.set_progress_mode(ProgressReportingMode::M73);

    connection.connect_with(link.transport()).await.unwrap();
    connection
        .start_print_text("steps.gcode", "G1 X1\nG1 X2\n")
        .await
        .unwrap();
    wait_for_state(&connection, CommunicationState::Finished).await;

    assert_eq!(link.sent(), vec!["G1 X1", "M73 P50", "G1 X2", "M73 P100"]);
}

#[tokio::test]
async fn pause_holds_file_lines_but_delivers_manual_commands() {
    let link = MockLink::new(Some("ok"));
    let connection = PrinterConnection::new(test_params());

    let lines: Vec<String> = (1..=12).map(|i| format!("G1 X{}", i)).collect();
    let content = lines.join("\n");

    connection.connect_with(link.transport()).await.unwrap();
    connection.start_print_text("long.gcode", &content).await.unwrap();

    let probe = link.clone();
    wait_for("a few lines on the wire", move || probe.sent_count() >= 3).await;
    connection.request_pause().await.unwrap();
    wait_for_state(&connection, CommunicationState::Paused).await;

    // No more file lines once the pause has taken effect
    let baseline = link.sent_count();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(link.sent_count(), baseline);

    // Manual commands still go out while paused
    connection.send_command("M104 S200").unwrap();
    let probe = link.clone();
    wait_for("manual command delivery", move || {
        probe.sent().last().map(|l| l == "M104 S200").unwrap_or(false)
    })
    .await;

    connection.resume().await.unwrap();
    wait_for_state(&connection, CommunicationState::Finished).await;

    let sent = link.sent();
    assert_eq!(sent.len(), lines.len() + 1);
    let file_lines: Vec<&String> = sent.iter().filter(|l| l.starts_with("G1")).collect();
    assert_eq!(file_lines.len(), lines.len());
    for (sent_line, expected) in file_lines.iter().zip(&lines) {
        assert_eq!(*sent_line, expected);
    }
}

#[tokio::test]
async fn ack_timeout_retries_then_disconnects_exactly_once() {
    let link = MockLink::new(None);
    let params = ConnectionParams {
        timeout_ms: 25,
        ..test_params()
    };
    let connection = PrinterConnection::new(params);
    let mut events = connection.subscribe();

    connection.connect_with(link.transport()).await.unwrap();
    connection
        .start_print_text("stall.gcode", "G28\nG1 X1\n")
        .await
        .unwrap();
    wait_for_state(&connection, CommunicationState::Disconnected).await;

    // Three transmissions of the same line, then the link is declared dead
    assert_eq!(link.sent(), vec!["G28", "G28", "G28"]);

    let drained = drain(&mut events);
    let disconnects: Vec<&PrinterEvent> = drained
        .iter()
        .filter(|e| matches!(e, PrinterEvent::Connection(ConnectionEvent::Disconnected { .. })))
        .collect();
    assert_eq!(disconnects.len(), 1);
    assert!(matches!(
        disconnects[0],
        PrinterEvent::Connection(ConnectionEvent::Disconnected {
            reason: DisconnectReason::AckTimeout,
            ..
        })
    ));

    let retries: Vec<u32> = drained
        .iter()
        .filter_map(|event| match event {
            PrinterEvent::Stream(StreamEvent::LineRetried { attempt, .. }) => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![2, 3]);

    let job = connection.job().unwrap();
    assert!(matches!(job.outcome(), JobOutcome::Failed { .. }));
    assert!(drained
        .iter()
        .any(|e| matches!(e, PrinterEvent::Job(JobEvent::Failed { .. }))));
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn device_errors_are_reported_without_stopping_the_print() {
    let link = MockLink::new(Some("ok"));
    link.script_replies(&["ok", "Error:Unknown command: \"XQZ\"", "ok"]);
    let connection = PrinterConnection::new(test_params());
    let mut events = connection.subscribe();

    connection.connect_with(link.transport()).await.unwrap();
    connection
        .start_print_text("odd.gcode", "G28\nXQZ\nG1 X5\n")
        .await
        .unwrap();
    wait_for_state(&connection, CommunicationState::Finished).await;

    assert_eq!(link.sent(), vec!["G28", "XQZ", "G1 X5"]);

    let drained = drain(&mut events);
    let reported = drained.iter().any(|event| match event {
        PrinterEvent::Error(DeviceErrorEvent::Reported { message }) => {
            message.contains("Unknown command")
        }
        _ => false,
    });
    assert!(reported);
    assert_eq!(*connection.job().unwrap().outcome(), JobOutcome::Completed);
}

#[tokio::test]
async fn temperature_reports_and_heater_commands_update_status() {
    let link = MockLink::new(Some("ok"));
    let connection = PrinterConnection::new(test_params());
    let mut events = connection.subscribe();

    connection.connect_with(link.transport()).await.unwrap();
    wait_for_state(&connection, CommunicationState::Connected).await;

    link.push_response("T:201.3 /210.0 B:58.1 /60.0 @:127 B@:0");
    wait_for("temperature report applied", || {
        connection.status().temperatures.hotend.current == 201.3
    })
    .await;

    let temperatures = connection.status().temperatures;
    assert_eq!(temperatures.hotend.target, 210.0);
    assert_eq!(temperatures.bed.current, 58.1);
    assert_eq!(temperatures.bed.target, 60.0);

    connection.set_bed_temperature(65.0).unwrap();
    wait_for("bed target from host command", || {
        connection.status().temperatures.bed.target == 65.0
    })
    .await;
    assert!(link.sent().contains(&"M140 S65".to_string()));

    let drained = drain(&mut events);
    let sources: Vec<&TemperatureSource> = drained
        .iter()
        .filter_map(|event| match event {
            PrinterEvent::Temperature(TemperatureEvent::Updated { source, .. }) => Some(source),
            _ => None,
        })
        .collect();
    assert!(sources.iter().any(|s| matches!(s, TemperatureSource::Report)));
    assert!(sources
        .iter()
        .any(|s| matches!(s, TemperatureSource::HostCommand)));
}

#[tokio::test]
async fn checksummed_session_frames_lines_and_honors_resend() {
    let link = MockLink::new(Some("ok"));
    link.script_replies(&["ok", "ok", "Resend: 1\nok", "ok", "ok"]);
    let params = ConnectionParams {
        use_checksums: true,
        ..test_params()
    };
    let connection = PrinterConnection::new(params);
    let mut events = connection.subscribe();

    connection.connect_with(link.transport()).await.unwrap();
    // The session opens with a line-number reset
    let probe = link.clone();
    wait_for("line number reset", move || probe.sent_count() >= 1).await;

    connection
        .start_print_text("framed.gcode", "G28\nG1 X5\n")
        .await
        .unwrap();
    wait_for_state(&connection, CommunicationState::Finished).await;

    let dialect = MarlinDialect::new();
    let reset = dialect.frame_line(0, "M110 N0");
    let expected = vec![
        reset.clone(),
        reset,
        dialect.frame_line(1, "G28"),
        dialect.frame_line(1, "G28"),
        dialect.frame_line(2, "G1 X5"),
    ];
    assert_eq!(link.sent(), expected);

    for line in link.sent() {
        let (payload, sum) = line.rsplit_once('*').unwrap();
        assert_eq!(sum.parse::<u8>().unwrap(), checksum(payload));
    }

    let retried = drain(&mut events).into_iter().any(|event| {
        matches!(
            event,
            PrinterEvent::Stream(StreamEvent::LineRetried { attempt: 2, .. })
        )
    });
    assert!(retried);
}

#[tokio::test]
async fn cancel_marks_the_job_and_allows_a_fresh_print() {
    let link = MockLink::new(Some("ok"));
    let connection = PrinterConnection::new(test_params());
    let mut events = connection.subscribe();

    let content: String = (1..=30)
        .map(|i| format!("G1 X{}\n", i))
        .collect();

    connection.connect_with(link.transport()).await.unwrap();
    connection.start_print_text("tall.gcode", &content).await.unwrap();

    let probe = link.clone();
    wait_for("print underway", move || probe.sent_count() >= 2).await;
    connection.stop(true).await.unwrap();
    wait_for_state(&connection, CommunicationState::Canceled).await;

    assert_eq!(*connection.job().unwrap().outcome(), JobOutcome::Canceled);
    let canceled = drain(&mut events).into_iter().any(|event| {
        matches!(event, PrinterEvent::Job(JobEvent::Canceled { percent }) if percent > 0.0)
    });
    assert!(canceled);

    // A terminal job state returns to idle and accepts the next print
    connection
        .start_print_text("next.gcode", "G28\nG1 X1\n")
        .await
        .unwrap();
    wait_for_state(&connection, CommunicationState::Finished).await;
    assert_eq!(*connection.job().unwrap().outcome(), JobOutcome::Completed);
}

#[tokio::test]
async fn calibration_prints_are_flagged_for_their_duration() {
    let link = MockLink::new(Some("ok"));
    let connection = PrinterConnection::new(test_params());

    let content: String = (1..=20).map(|i| format!("G1 X{}\n", i)).collect();
    connection.connect_with(link.transport()).await.unwrap();
    connection
        .start_calibration_print("bed-level.gcode", &content)
        .await
        .unwrap();

    wait_for("calibration flag", || connection.status().flags.calibration_print).await;

    wait_for_state(&connection, CommunicationState::Finished).await;
    assert!(!connection.status().flags.calibration_print);
    assert_eq!(*connection.job().unwrap().outcome(), JobOutcome::Completed);
}

#[tokio::test]
async fn read_failure_fails_the_job_and_disconnects() {
    let link = MockLink::new(Some("ok"));
    let connection = PrinterConnection::new(test_params());
    let mut events = connection.subscribe();

    let content: String = (1..=30).map(|i| format!("G1 X{}\n", i)).collect();
    connection.connect_with(link.transport()).await.unwrap();
    connection.start_print_text("doomed.gcode", &content).await.unwrap();

    let probe = link.clone();
    wait_for("print underway", move || probe.sent_count() >= 2).await;
    link.fail_reads();
    wait_for_state(&connection, CommunicationState::Disconnected).await;

    assert!(matches!(
        connection.job().unwrap().outcome(),
        JobOutcome::Failed { .. }
    ));
    let drained = drain(&mut events);
    let disconnects = drained
        .iter()
        .filter(|e| {
            matches!(
                e,
                PrinterEvent::Connection(ConnectionEvent::Disconnected {
                    reason: DisconnectReason::ConnectionLost,
                    ..
                })
            )
        })
        .count();
    assert_eq!(disconnects, 1);
}

#[tokio::test]
async fn disconnect_mid_print_cancels_the_job() {
    let link = MockLink::new(Some("ok"));
    let connection = PrinterConnection::new(test_params());
    let mut events = connection.subscribe();

    let content: String = (1..=30).map(|i| format!("G1 X{}\n", i)).collect();
    connection.connect_with(link.transport()).await.unwrap();
    connection.start_print_text("walkaway.gcode", &content).await.unwrap();

    let probe = link.clone();
    wait_for("print underway", move || probe.sent_count() >= 2).await;
    connection.disconnect().await.unwrap();

    assert_eq!(connection.state(), CommunicationState::Disconnected);
    assert_eq!(*connection.job().unwrap().outcome(), JobOutcome::Canceled);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        PrinterEvent::Connection(ConnectionEvent::Disconnected {
            reason: DisconnectReason::UserRequested,
            ..
        })
    )));
}

#[tokio::test]
async fn logical_misuse_is_rejected_synchronously() {
    let link = MockLink::new(Some("ok"));
    let connection = PrinterConnection::new(test_params());

    // Nothing works while disconnected
    assert!(matches!(
        connection.start_print_text("x.gcode", "G28").await,
        Err(Error::State(StateError::NotConnected))
    ));
    assert!(matches!(
        connection.send_command("G28"),
        Err(Error::State(StateError::NotConnected))
    ));

    connection.connect_with(link.transport()).await.unwrap();
    wait_for_state(&connection, CommunicationState::Connected).await;

    // Double connect is a logical error
    let second = MockLink::new(Some("ok"));
    assert!(matches!(
        connection.connect_with(second.transport()).await,
        Err(Error::State(StateError::AlreadyConnected))
    ));

    // Pause and stop require an active print
    assert!(matches!(
        connection.request_pause().await,
        Err(Error::State(StateError::InvalidTransition { .. }))
    ));
    assert!(matches!(
        connection.stop(true).await,
        Err(Error::State(StateError::NoActiveJob))
    ));

    // Starting twice is rejected while a print is running
    let content: String = (1..=30).map(|i| format!("G1 X{}\n", i)).collect();
    connection.start_print_text("busy.gcode", &content).await.unwrap();
    wait_for_state(&connection, CommunicationState::Printing).await;
    assert!(matches!(
        connection.start_print_text("again.gcode", "G28").await,
        Err(Error::State(StateError::PrintInProgress))
    ));
}

#[tokio::test]
async fn idle_temperature_polling_sends_the_query() {
    let link = MockLink::new(Some("ok"));
    let params = ConnectionParams {
        temperature_poll_secs: 1,
        ..test_params()
    };
    let connection = PrinterConnection::new(params);

    connection.connect_with(link.transport()).await.unwrap();
    wait_for_state(&connection, CommunicationState::Connected).await;

    let probe = link.clone();
    wait_for("temperature poll", move || {
        probe.sent().iter().any(|line| line == "M105")
    })
    .await;
}
