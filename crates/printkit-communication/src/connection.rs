//! Printer connection management
//!
//! One [`PrinterConnection`] owns one printer link. API methods touch
//! shared state or enqueue requests; a dedicated worker task drives the
//! transport. The worker reads firmware responses, applies one-command
//! in-flight flow control, pulls print lines from the stream chain, and
//! publishes every observable change on the connection's event bus.
//!
//! Transport failures are never surfaced as `Err` from `connect`; they
//! arrive as connection events. `Err` returns are reserved for logical
//! misuse (connecting twice, pausing with no active print).

use crate::firmware::{FirmwareDialect, FirmwareResponse, MarlinDialect, TemperatureReport};
use crate::transport::{find_printer_port, ConnectionParams, LineTransport, SerialTransport};
use parking_lot::RwLock;
use printkit_core::{
    CommunicationState, ConnectionEvent, DeviceErrorEvent, DisconnectReason, EventBus, JobEvent,
    PauseState, PositionEvent, PositioningMode, PrintJob, PrinterEvent, PrinterFlags, PrinterMove,
    PrinterStatus, ProgressReportingMode, Result, StateError, StateEvent, StreamEvent,
    TemperatureEvent, TemperatureSource, Temperatures,
};
use printkit_gcode::{
    build_print_chain, is_movement_line, parse_partial, CommandInjector, FileGcodeStream,
    GcodeStream, SharedDestination, SharedJob, SharedPositioningMode, SharedState, StreamProgress,
    StringGcodeStream,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

/// Worker scheduling granularity
const LOOP_DELAY_MS: u64 = 10;

/// Capacity of the API-to-worker request channel
const REQUEST_QUEUE_SIZE: usize = 100;

/// Framed lines kept for resend requests
const RESEND_HISTORY: usize = 32;

/// Reconnection attempts after an unexpected link loss
const RECONNECT_ATTEMPTS: u32 = 3;

/// Delay between reconnection attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Factory that reopens the underlying link for auto-reconnect
type TransportFactory = Box<dyn Fn() -> Result<Box<dyn LineTransport>> + Send>;

/// Requests the API sends to the worker task
enum WorkerRequest {
    StartPrint(Box<PrintSetup>),
    Pause,
    Resume,
    Stop { mark_canceled: bool },
}

/// Everything the worker needs to begin streaming a job
struct PrintSetup {
    chain: Box<dyn GcodeStream>,
    progress: Arc<StreamProgress>,
    description: String,
    total_lines: usize,
    calibration: bool,
}

/// Connection to one printer.
///
/// Cheap accessors read the shared snapshots directly; anything that
/// touches the wire goes through the worker task.
pub struct PrinterConnection {
    params: ConnectionParams,
    dialect: Arc<dyn FirmwareDialect>,
    event_bus: Arc<EventBus>,
    state: SharedState,
    job: SharedJob,
    pause: Arc<RwLock<PauseState>>,
    flags: Arc<RwLock<PrinterFlags>>,
    temperatures: Arc<RwLock<Temperatures>>,
    destination: SharedDestination,
    positioning_mode: SharedPositioningMode,
    progress_mode: Arc<RwLock<ProgressReportingMode>>,
    injector: CommandInjector,
    request_tx: Arc<RwLock<Option<mpsc::Sender<WorkerRequest>>>>,
    shutdown_tx: Arc<RwLock<Option<mpsc::Sender<()>>>>,
    io_task: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl PrinterConnection {
    /// Create a connection speaking the Marlin dialect
    pub fn new(params: ConnectionParams) -> Self {
        Self::with_dialect(params, Arc::new(MarlinDialect::new()))
    }

    /// Create a connection with an explicit firmware dialect
    pub fn with_dialect(params: ConnectionParams, dialect: Arc<dyn FirmwareDialect>) -> Self {
        Self {
            params,
            dialect,
            event_bus: Arc::new(EventBus::new()),
            state: Arc::new(RwLock::new(CommunicationState::Disconnected)),
            job: Arc::new(RwLock::new(None)),
            pause: Arc::new(RwLock::new(PauseState::NotPaused)),
            flags: Arc::new(RwLock::new(PrinterFlags::default())),
            temperatures: Arc::new(RwLock::new(Temperatures::default())),
            destination: Arc::new(RwLock::new(PrinterMove::default())),
            positioning_mode: Arc::new(RwLock::new(PositioningMode::Absolute)),
            progress_mode: Arc::new(RwLock::new(ProgressReportingMode::default())),
            injector: CommandInjector::new(),
            request_tx: Arc::new(RwLock::new(None)),
            shutdown_tx: Arc::new(RwLock::new(None)),
            io_task: Arc::new(RwLock::new(None)),
        }
    }

    /// Event bus carrying everything observable about this connection
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Broadcast receiver over the event bus
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PrinterEvent> {
        self.event_bus.receiver()
    }

    /// Parameters this connection was created with
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Current communication state
    pub fn state(&self) -> CommunicationState {
        *self.state.read()
    }

    /// Whether the link is up (connected, printing, or paused)
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Point-in-time snapshot for status displays
    pub fn status(&self) -> PrinterStatus {
        PrinterStatus {
            state: *self.state.read(),
            pause: *self.pause.read(),
            flags: *self.flags.read(),
            position: *self.destination.read(),
            temperatures: *self.temperatures.read(),
            percent_complete: self
                .job
                .read()
                .as_ref()
                .map(|job| job.percent_done())
                .unwrap_or(0.0),
        }
    }

    /// Snapshot of the current (or most recent) job, if any
    pub fn job(&self) -> Option<PrintJob> {
        self.job.read().clone()
    }

    /// Progress reporting mode used when the next print chain is built
    pub fn set_progress_mode(&self, mode: ProgressReportingMode) {
        *self.progress_mode.write() = mode;
    }

    /// Open the configured serial port and start the worker.
    ///
    /// A port of `Auto` probes for the first printer-like port. Failure
    /// to open is reported as a `ConnectionFailed` event, not an `Err`;
    /// only connecting while already connected returns an error.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_disconnected()?;
        self.reap_worker().await;

        let mut params = self.params.clone();
        if let Err(error) = resolve_port(&mut params) {
            tracing::warn!("Port discovery failed: {}", error);
            self.emit(PrinterEvent::Connection(ConnectionEvent::ConnectionFailed {
                port: params.port.clone(),
                error: error.to_string(),
            }));
            return Ok(());
        }

        self.transition(CommunicationState::Connecting);
        self.emit(PrinterEvent::Connection(ConnectionEvent::Connecting {
            port: params.port.clone(),
        }));

        match SerialTransport::open(&params) {
            Ok(transport) => {
                let reopen_params = params.clone();
                let reopen: TransportFactory = Box::new(move || {
                    SerialTransport::open(&reopen_params)
                        .map(|t| Box::new(t) as Box<dyn LineTransport>)
                });
                self.spawn_worker(params, Box::new(transport), Some(reopen));
                Ok(())
            }
            Err(error) => {
                self.transition(CommunicationState::Disconnected);
                self.emit(PrinterEvent::Connection(ConnectionEvent::ConnectionFailed {
                    port: params.port.clone(),
                    error: error.to_string(),
                }));
                Ok(())
            }
        }
    }

    /// Connect over an already-open transport.
    ///
    /// Used by tests and non-serial links; auto-reconnect does not apply
    /// because the connection cannot reopen a link it did not create.
    pub async fn connect_with(&self, transport: Box<dyn LineTransport>) -> Result<()> {
        self.ensure_disconnected()?;
        self.reap_worker().await;

        let mut params = self.params.clone();
        params.port = transport.description();

        self.transition(CommunicationState::Connecting);
        self.emit(PrinterEvent::Connection(ConnectionEvent::Connecting {
            port: params.port.clone(),
        }));
        self.spawn_worker(params, transport, None);
        Ok(())
    }

    /// Stop the worker and release the link.
    ///
    /// An active job is canceled. Idempotent when already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        self.reap_worker().await;
        Ok(())
    }

    /// Stream a G-code file to the printer
    pub async fn start_print(&self, path: impl AsRef<Path>) -> Result<()> {
        let source = FileGcodeStream::open(path)?;
        let description = source.description();
        let progress = source.progress();
        self.begin_print(Box::new(source), progress, description, false)
            .await
    }

    /// Stream an in-memory G-code script
    pub async fn start_print_text(
        &self,
        description: impl Into<String>,
        content: &str,
    ) -> Result<()> {
        let source = StringGcodeStream::new(content);
        let progress = source.progress();
        self.begin_print(Box::new(source), progress, description.into(), false)
            .await
    }

    /// Stream a calibration pattern; the job is flagged accordingly
    pub async fn start_calibration_print(
        &self,
        description: impl Into<String>,
        content: &str,
    ) -> Result<()> {
        let source = StringGcodeStream::new(content);
        let progress = source.progress();
        self.begin_print(Box::new(source), progress, description.into(), true)
            .await
    }

    /// Request a pause at the next line boundary
    pub async fn request_pause(&self) -> Result<()> {
        let state = self.state();
        if state != CommunicationState::Printing {
            return Err(StateError::InvalidTransition {
                current: state.to_string(),
                requested: CommunicationState::Paused.to_string(),
            }
            .into());
        }
        *self.pause.write() = PauseState::PauseRequested;
        self.send_request(WorkerRequest::Pause).await
    }

    /// Resume a paused print
    pub async fn resume(&self) -> Result<()> {
        let state = self.state();
        if state != CommunicationState::Paused {
            return Err(StateError::InvalidTransition {
                current: state.to_string(),
                requested: CommunicationState::Printing.to_string(),
            }
            .into());
        }
        self.send_request(WorkerRequest::Resume).await
    }

    /// End the active print, marking the job canceled or finished
    pub async fn stop(&self, mark_canceled: bool) -> Result<()> {
        let state = self.state();
        if !matches!(
            state,
            CommunicationState::Printing | CommunicationState::Paused
        ) {
            return Err(StateError::NoActiveJob.into());
        }
        self.send_request(WorkerRequest::Stop { mark_canceled }).await
    }

    /// Queue a manual command.
    ///
    /// During a print it is injected ahead of the next file line; while
    /// idle or paused the worker sends it directly.
    pub fn send_command(&self, command: &str) -> Result<()> {
        if !self.state().accepts_commands() {
            return Err(StateError::NotConnected.into());
        }
        self.injector.add(command);
        Ok(())
    }

    /// Relative jog: G91, the move, then back to G90
    pub fn jog(&self, dx: f64, dy: f64, dz: f64, feed_rate: f64) -> Result<()> {
        let mut words = String::new();
        for (letter, delta) in [('X', dx), ('Y', dy), ('Z', dz)] {
            if delta != 0.0 {
                words.push_str(&format!(" {}{}", letter, delta));
            }
        }
        if words.is_empty() {
            return Ok(());
        }
        self.send_command(&format!("G91\nG1{} F{}\nG90", words, feed_rate))
    }

    /// Set the hotend target temperature (M104)
    pub fn set_hotend_temperature(&self, celsius: f64) -> Result<()> {
        self.send_command(&format!("M104 S{}", celsius))
    }

    /// Set the bed target temperature (M140)
    pub fn set_bed_temperature(&self, celsius: f64) -> Result<()> {
        self.send_command(&format!("M140 S{}", celsius))
    }

    async fn begin_print(
        &self,
        source: Box<dyn GcodeStream>,
        progress: Arc<StreamProgress>,
        description: String,
        calibration: bool,
    ) -> Result<()> {
        match self.state() {
            CommunicationState::Connected
            | CommunicationState::Finished
            | CommunicationState::Canceled => {}
            CommunicationState::Printing | CommunicationState::Paused => {
                return Err(StateError::PrintInProgress.into());
            }
            _ => return Err(StateError::NotConnected.into()),
        }

        let total_lines = progress.total_lines();
        let chain = build_print_chain(
            source,
            self.injector.clone(),
            self.destination.clone(),
            self.positioning_mode.clone(),
            *self.progress_mode.read(),
            self.state.clone(),
            self.job.clone(),
        );

        self.send_request(WorkerRequest::StartPrint(Box::new(PrintSetup {
            chain,
            progress,
            description,
            total_lines,
            calibration,
        })))
        .await
    }

    async fn send_request(&self, request: WorkerRequest) -> Result<()> {
        let tx = self.request_tx.read().clone();
        match tx {
            Some(tx) => tx
                .send(request)
                .await
                .map_err(|_| StateError::NotConnected.into()),
            None => Err(StateError::NotConnected.into()),
        }
    }

    fn spawn_worker(
        &self,
        params: ConnectionParams,
        transport: Box<dyn LineTransport>,
        reopen: Option<TransportFactory>,
    ) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_SIZE);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        *self.request_tx.write() = Some(request_tx);
        *self.shutdown_tx.write() = Some(shutdown_tx);

        let port = params.port.clone();
        let worker = Worker {
            port: port.clone(),
            params,
            transport,
            reopen,
            dialect: self.dialect.clone(),
            bus: self.event_bus.clone(),
            state: self.state.clone(),
            job: self.job.clone(),
            pause: self.pause.clone(),
            flags: self.flags.clone(),
            temperatures: self.temperatures.clone(),
            destination: self.destination.clone(),
            positioning_mode: self.positioning_mode.clone(),
            injector: self.injector.clone(),
            request_rx,
            shutdown_rx,
            chain: None,
            progress: None,
            outstanding: None,
            history: VecDeque::new(),
            line_number: 0,
            pending_line_reset: false,
            skip_next_ok: false,
            last_poll: Instant::now(),
            last_reported_percent: -1.0,
        };

        self.transition(CommunicationState::Connected);
        self.emit(PrinterEvent::Connection(ConnectionEvent::Connected { port }));

        *self.io_task.write() = Some(tokio::spawn(worker.run()));
    }

    fn ensure_disconnected(&self) -> Result<()> {
        if self.state() == CommunicationState::Disconnected {
            Ok(())
        } else {
            Err(StateError::AlreadyConnected.into())
        }
    }

    /// Signal the worker (if any) and wait for it to exit.
    ///
    /// Covers workers that already died on a link failure and workers
    /// still sleeping between reconnect attempts.
    async fn reap_worker(&self) {
        if let Some(tx) = self.shutdown_tx.write().take() {
            let _ = tx.try_send(());
        }
        *self.request_tx.write() = None;

        let handle = self.io_task.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn transition(&self, new_state: CommunicationState) {
        transition_shared(&self.state, new_state, &self.event_bus);
    }

    fn emit(&self, event: PrinterEvent) {
        self.event_bus.publish(event);
    }
}

/// Replace an `Auto` port with the first discovered printer port
fn resolve_port(params: &mut ConnectionParams) -> Result<()> {
    if !params.is_auto_port() {
        return Ok(());
    }
    match find_printer_port()? {
        Some(port) => {
            tracing::info!("Auto-selected {}", port);
            params.port = port;
            Ok(())
        }
        None => Err(printkit_core::TransportError::PortNotFound {
            port: "Auto".to_string(),
        }
        .into()),
    }
}

/// Apply a state transition and publish the change.
///
/// Transitions the table rejects are logged and dropped rather than
/// applied, so shared state never holds an impossible value.
fn transition_shared(state: &SharedState, new_state: CommunicationState, bus: &EventBus) {
    let old = {
        let mut guard = state.write();
        let old = *guard;
        if !old.can_transition_to(new_state) {
            tracing::warn!("Rejected state transition {} -> {}", old, new_state);
            return;
        }
        *guard = new_state;
        old
    };
    if old != new_state {
        tracing::info!("Communication state {} -> {}", old, new_state);
        bus.publish(PrinterEvent::State(StateEvent::Changed {
            old,
            new: new_state,
        }));
    }
}

/// The line currently awaiting acknowledgement
struct OutstandingLine {
    /// The command as the stream produced it
    command: String,
    /// The line as transmitted (framed when checksums are on)
    framed: String,
    /// Frame number, when checksums are on
    line_number: Option<u32>,
    /// Transmissions so far, including the first send
    attempts: u32,
    /// When the current transmission times out
    deadline: Instant,
}

/// The I/O task behind one connection.
///
/// Owns the transport exclusively. Each loop iteration drains incoming
/// lines, applies API requests, checks the acknowledgement deadline,
/// and sends at most one line when nothing is in flight.
struct Worker {
    port: String,
    params: ConnectionParams,
    transport: Box<dyn LineTransport>,
    reopen: Option<TransportFactory>,
    dialect: Arc<dyn FirmwareDialect>,
    bus: Arc<EventBus>,
    state: SharedState,
    job: SharedJob,
    pause: Arc<RwLock<PauseState>>,
    flags: Arc<RwLock<PrinterFlags>>,
    temperatures: Arc<RwLock<Temperatures>>,
    destination: SharedDestination,
    positioning_mode: SharedPositioningMode,
    injector: CommandInjector,
    request_rx: mpsc::Receiver<WorkerRequest>,
    shutdown_rx: mpsc::Receiver<()>,

    chain: Option<Box<dyn GcodeStream>>,
    progress: Option<Arc<StreamProgress>>,
    outstanding: Option<OutstandingLine>,
    history: VecDeque<(u32, String)>,
    line_number: u32,
    pending_line_reset: bool,
    /// Marlin follows `Resend:` with its own `ok`; that ok must not
    /// acknowledge the retransmitted line
    skip_next_ok: bool,
    last_poll: Instant,
    last_reported_percent: f64,
}

impl Worker {
    async fn run(mut self) {
        tracing::debug!("I/O worker started for {}", self.port);
        self.pending_line_reset = self.params.use_checksums;

        let loop_delay = Duration::from_millis(LOOP_DELAY_MS);
        loop {
            if self.shutdown_requested() {
                self.shutdown();
                return;
            }

            if let Err(reason) = self.drive() {
                if !self.handle_link_failure(reason).await {
                    return;
                }
            }

            tokio::time::sleep(loop_delay).await;
        }
    }

    /// One scheduling slice: responses in, requests, flow control, line out
    fn drive(&mut self) -> std::result::Result<(), DisconnectReason> {
        self.read_phase()?;
        self.request_phase();
        self.timeout_phase()?;
        self.write_phase()?;
        self.poll_phase()
    }

    // 1. READ: drain everything the firmware sent
    fn read_phase(&mut self) -> std::result::Result<(), DisconnectReason> {
        loop {
            match self.transport.read_line() {
                Ok(Some(line)) => self.handle_response(&line)?,
                Ok(None) => return Ok(()),
                Err(error) => {
                    tracing::warn!("Read from {} failed: {}", self.port, error);
                    return Err(DisconnectReason::ConnectionLost);
                }
            }
        }
    }

    fn handle_response(&mut self, line: &str) -> std::result::Result<(), DisconnectReason> {
        self.emit(PrinterEvent::Stream(StreamEvent::LineReceived {
            line: line.to_string(),
        }));

        match self.dialect.parse_response(line) {
            FirmwareResponse::Ok { temperatures } => {
                if let Some(report) = temperatures {
                    self.apply_temperature_report(&report);
                }
                if self.skip_next_ok {
                    self.skip_next_ok = false;
                } else {
                    self.outstanding = None;
                }
            }
            FirmwareResponse::Resend { line_number } => self.handle_resend(line_number)?,
            FirmwareResponse::Error { message } => {
                tracing::error!("Device error: {}", message);
                self.emit(PrinterEvent::Error(DeviceErrorEvent::Reported { message }));
                // Marlin reports the error in place of a bare ok; the
                // outstanding line will not be acknowledged separately
                self.outstanding = None;
            }
            FirmwareResponse::Busy { detail } => {
                tracing::debug!("Device busy: {}", detail);
                let deadline = Instant::now() + self.ack_timeout();
                if let Some(outstanding) = self.outstanding.as_mut() {
                    outstanding.deadline = deadline;
                }
            }
            FirmwareResponse::Temperature(report) => self.apply_temperature_report(&report),
            FirmwareResponse::Start => tracing::info!("Firmware boot banner received"),
            FirmwareResponse::Info { message } => tracing::debug!("Device: {}", message),
            FirmwareResponse::Unrecognized { line } => {
                self.emit(PrinterEvent::Error(DeviceErrorEvent::Malformed { line }));
            }
        }
        Ok(())
    }

    fn handle_resend(&mut self, line_number: u32) -> std::result::Result<(), DisconnectReason> {
        self.skip_next_ok = true;

        let framed = self
            .outstanding
            .as_ref()
            .filter(|out| out.line_number == Some(line_number))
            .map(|out| out.framed.clone())
            .or_else(|| {
                self.history
                    .iter()
                    .find(|(n, _)| *n == line_number)
                    .map(|(_, framed)| framed.clone())
            });

        let Some(framed) = framed else {
            tracing::error!("Resend requested for unknown line {}", line_number);
            self.emit(PrinterEvent::Error(DeviceErrorEvent::Reported {
                message: format!("resend requested for unknown line {}", line_number),
            }));
            return Ok(());
        };

        tracing::warn!("Resending line {}", line_number);
        self.transport.write_line(&framed).map_err(|error| {
            tracing::warn!("Write to {} failed: {}", self.port, error);
            DisconnectReason::ConnectionLost
        })?;

        let attempts = self.outstanding.as_ref().map_or(1, |out| out.attempts + 1);
        self.outstanding = Some(OutstandingLine {
            command: framed.clone(),
            framed: framed.clone(),
            line_number: Some(line_number),
            attempts,
            deadline: Instant::now() + self.ack_timeout(),
        });
        self.emit(PrinterEvent::Stream(StreamEvent::LineRetried {
            line: framed,
            attempt: attempts,
        }));
        Ok(())
    }

    // 2. REQUESTS: apply everything the API enqueued
    fn request_phase(&mut self) {
        while let Ok(request) = self.request_rx.try_recv() {
            match request {
                WorkerRequest::StartPrint(setup) => self.handle_start_print(*setup),
                WorkerRequest::Pause => self.handle_pause(),
                WorkerRequest::Resume => self.handle_resume(),
                WorkerRequest::Stop { mark_canceled } => self.handle_stop(mark_canceled),
            }
        }
    }

    fn handle_start_print(&mut self, setup: PrintSetup) {
        let current = *self.state.read();
        if matches!(
            current,
            CommunicationState::Finished | CommunicationState::Canceled
        ) {
            transition_shared(&self.state, CommunicationState::Connected, &self.bus);
        }
        if *self.state.read() != CommunicationState::Connected {
            tracing::warn!("Dropping print request while {}", current);
            return;
        }

        *self.destination.write() = PrinterMove::default();
        *self.positioning_mode.write() = PositioningMode::Absolute;
        *self.pause.write() = PauseState::NotPaused;
        self.flags.write().calibration_print = setup.calibration;
        *self.job.write() = Some(PrintJob::new(setup.description.clone(), setup.total_lines));

        self.chain = Some(setup.chain);
        self.progress = Some(setup.progress);
        self.last_reported_percent = -1.0;
        if self.params.use_checksums {
            self.pending_line_reset = true;
        }

        tracing::info!(
            "Print started: {} ({} lines)",
            setup.description,
            setup.total_lines
        );
        self.emit(PrinterEvent::Job(JobEvent::Started {
            description: setup.description,
            total_lines: setup.total_lines,
        }));
        transition_shared(&self.state, CommunicationState::Printing, &self.bus);
    }

    fn handle_pause(&mut self) {
        if *self.state.read() != CommunicationState::Printing {
            return;
        }
        *self.pause.write() = PauseState::Paused;
        transition_shared(&self.state, CommunicationState::Paused, &self.bus);
        self.emit(PrinterEvent::Job(JobEvent::Paused));
        tracing::info!("Print paused");
    }

    fn handle_resume(&mut self) {
        if *self.state.read() != CommunicationState::Paused {
            return;
        }
        *self.pause.write() = PauseState::NotPaused;
        transition_shared(&self.state, CommunicationState::Printing, &self.bus);
        self.emit(PrinterEvent::Job(JobEvent::Resumed));
        tracing::info!("Print resumed");
    }

    fn handle_stop(&mut self, mark_canceled: bool) {
        let current = *self.state.read();
        if !matches!(
            current,
            CommunicationState::Printing | CommunicationState::Paused
        ) {
            return;
        }

        self.chain = None;
        self.progress = None;
        *self.pause.write() = PauseState::NotPaused;
        self.flags.write().calibration_print = false;

        if mark_canceled {
            let percent = {
                let mut job = self.job.write();
                job.as_mut().map(|job| {
                    job.mark_canceled();
                    job.percent_done()
                })
            };
            if let Some(percent) = percent {
                self.emit(PrinterEvent::Job(JobEvent::Canceled { percent }));
            }
            transition_shared(&self.state, CommunicationState::Canceled, &self.bus);
            tracing::info!("Print canceled");
        } else {
            self.finish_job();
            transition_shared(&self.state, CommunicationState::Finished, &self.bus);
            tracing::info!("Print stopped and marked finished");
        }
    }

    // 3. TIMEOUT: retransmit or give up on the outstanding line
    fn timeout_phase(&mut self) -> std::result::Result<(), DisconnectReason> {
        let (framed, attempt) = {
            let Some(outstanding) = self.outstanding.as_mut() else {
                return Ok(());
            };
            if Instant::now() < outstanding.deadline {
                return Ok(());
            }
            if outstanding.attempts >= self.params.ack_retries {
                tracing::error!(
                    "No acknowledgement for '{}' after {} attempts",
                    outstanding.command,
                    outstanding.attempts
                );
                return Err(DisconnectReason::AckTimeout);
            }
            outstanding.attempts += 1;
            outstanding.deadline = Instant::now() + Duration::from_millis(self.params.timeout_ms);
            (outstanding.framed.clone(), outstanding.attempts)
        };

        tracing::warn!("Acknowledgement timeout, retrying '{}' (attempt {})", framed, attempt);
        self.transport.write_line(&framed).map_err(|error| {
            tracing::warn!("Write to {} failed: {}", self.port, error);
            DisconnectReason::ConnectionLost
        })?;
        self.emit(PrinterEvent::Stream(StreamEvent::LineRetried {
            line: framed,
            attempt,
        }));
        Ok(())
    }

    // 4. WRITE: send at most one line when nothing is in flight
    fn write_phase(&mut self) -> std::result::Result<(), DisconnectReason> {
        if self.outstanding.is_some() {
            return Ok(());
        }

        if self.pending_line_reset {
            self.line_number = 0;
            self.history.clear();
            let reset = self.dialect.line_number_reset().to_string();
            self.send_line(&reset, false)?;
            self.pending_line_reset = false;
            return Ok(());
        }

        let state = *self.state.read();
        match state {
            CommunicationState::Printing => self.stream_next_line(),
            CommunicationState::Connected
            | CommunicationState::Paused
            | CommunicationState::Finished
            | CommunicationState::Canceled => self.drain_manual_command(),
            _ => Ok(()),
        }
    }

    fn stream_next_line(&mut self) -> std::result::Result<(), DisconnectReason> {
        let line = match self.chain.as_mut() {
            Some(chain) => chain.read_line(),
            None => return Ok(()),
        };
        match line {
            Some(line) => self.send_line(&line, true),
            None => {
                tracing::info!("Print stream finished");
                self.chain = None;
                self.progress = None;
                self.flags.write().calibration_print = false;
                self.finish_job();
                transition_shared(&self.state, CommunicationState::Finished, &self.bus);
                Ok(())
            }
        }
    }

    fn drain_manual_command(&mut self) -> std::result::Result<(), DisconnectReason> {
        match self.injector.pop() {
            Some(command) => self.send_line(&command, false),
            None => Ok(()),
        }
    }

    // 5. POLL: query temperatures while idle
    fn poll_phase(&mut self) -> std::result::Result<(), DisconnectReason> {
        if self.params.temperature_poll_secs == 0 || self.outstanding.is_some() {
            return Ok(());
        }
        let state = *self.state.read();
        if state == CommunicationState::Printing || !state.is_connected() {
            return Ok(());
        }
        if self.last_poll.elapsed() < Duration::from_secs(self.params.temperature_poll_secs) {
            return Ok(());
        }
        self.last_poll = Instant::now();
        let query = self.dialect.temperature_query().to_string();
        self.send_line(&query, false)
    }

    fn send_line(
        &mut self,
        command: &str,
        from_chain: bool,
    ) -> std::result::Result<(), DisconnectReason> {
        let (framed, line_number) = if self.params.use_checksums {
            let n = self.line_number;
            let framed = self.dialect.frame_line(n, command);
            self.history.push_back((n, framed.clone()));
            while self.history.len() > RESEND_HISTORY {
                self.history.pop_front();
            }
            self.line_number += 1;
            (framed, Some(n))
        } else {
            (command.to_string(), None)
        };

        self.transport.write_line(&framed).map_err(|error| {
            tracing::warn!("Write to {} failed: {}", self.port, error);
            DisconnectReason::ConnectionLost
        })?;

        self.outstanding = Some(OutstandingLine {
            command: command.to_string(),
            framed: framed.clone(),
            line_number,
            attempts: 1,
            deadline: Instant::now() + self.ack_timeout(),
        });

        self.emit(PrinterEvent::Stream(StreamEvent::LineSent { line: framed }));
        self.track_sent_command(command, from_chain);
        if from_chain {
            self.account_chain_line();
        }
        Ok(())
    }

    /// Update shared snapshots from the command that just went out
    fn track_sent_command(&mut self, command: &str, from_chain: bool) {
        let mut words = command.split_whitespace();
        let Some(code) = words.next() else {
            return;
        };

        match code {
            "G90" => *self.positioning_mode.write() = PositioningMode::Absolute,
            "G91" => *self.positioning_mode.write() = PositioningMode::Relative,
            "M80" => self.flags.write().atx_power_enabled = true,
            "M81" => self.flags.write().atx_power_enabled = false,
            "M104" | "M109" => {
                if let Some(target) = word_value(command, 'S') {
                    self.temperatures.write().hotend.target = target;
                    self.emit_temperatures(TemperatureSource::HostCommand);
                }
            }
            "M140" | "M190" => {
                if let Some(target) = word_value(command, 'S') {
                    self.temperatures.write().bed.target = target;
                    self.emit_temperatures(TemperatureSource::HostCommand);
                }
            }
            "M73" => {
                // Slicer time hint: M73 R<minutes remaining>
                if let Some(minutes) = word_value(command, 'R') {
                    let mut job = self.job.write();
                    if let Some(job) = job.as_mut() {
                        job.set_remaining_hint(minutes * 60.0);
                    }
                }
            }
            _ => {}
        }

        if is_movement_line(command) {
            if !from_chain {
                // Manual moves bypass the chain; fold them here and
                // resync the chain's notion of the position
                if let Some(partial) = parse_partial(command) {
                    let mode = *self.positioning_mode.read();
                    let next = {
                        let mut destination = self.destination.write();
                        let updated = partial.apply_to(&destination, mode);
                        *destination = updated;
                        updated
                    };
                    if let Some(chain) = self.chain.as_mut() {
                        chain.set_printer_position(next);
                    }
                }
            }
            self.emit(PrinterEvent::Position(PositionEvent::DestinationChanged {
                position: *self.destination.read(),
            }));
        }
    }

    /// Progress bookkeeping for a line pulled from the chain
    fn account_chain_line(&mut self) {
        let Some(percent) = self.progress.as_ref().map(|p| p.percent_complete()) else {
            return;
        };
        {
            let mut job = self.job.write();
            if let Some(job) = job.as_mut() {
                job.record_line_sent();
                job.update_percent_done(percent);
            }
        }
        let rounded = percent.round();
        if rounded > self.last_reported_percent {
            self.last_reported_percent = rounded;
            self.emit(PrinterEvent::Job(JobEvent::ProgressChanged { percent: rounded }));
        }
    }

    fn apply_temperature_report(&mut self, report: &TemperatureReport) {
        report.apply_to(&mut self.temperatures.write());
        self.emit_temperatures(TemperatureSource::Report);
    }

    fn emit_temperatures(&self, source: TemperatureSource) {
        self.emit(PrinterEvent::Temperature(TemperatureEvent::Updated {
            temperatures: *self.temperatures.read(),
            source,
        }));
    }

    fn finish_job(&mut self) {
        let seconds = {
            let mut job = self.job.write();
            job.as_mut().map(|job| {
                job.mark_completed();
                job.seconds_printed()
            })
        };
        if let Some(seconds_printed) = seconds {
            self.emit(PrinterEvent::Job(JobEvent::Finished { seconds_printed }));
        }
    }

    fn fail_active_job(&mut self, reason: &DisconnectReason) {
        let message = match reason {
            DisconnectReason::AckTimeout => "acknowledgement timeout".to_string(),
            DisconnectReason::ConnectionLost => "connection lost".to_string(),
            DisconnectReason::UserRequested => "disconnected".to_string(),
            DisconnectReason::Error(message) => message.clone(),
        };
        let failed = {
            let mut job = self.job.write();
            match job.as_mut() {
                Some(job) if job.is_active() => {
                    job.mark_failed(message.clone());
                    true
                }
                _ => false,
            }
        };
        if failed {
            self.emit(PrinterEvent::Job(JobEvent::Failed { reason: message }));
        }
    }

    /// Tear down after a link failure; returns true when reconnected
    async fn handle_link_failure(&mut self, reason: DisconnectReason) -> bool {
        self.fail_active_job(&reason);
        let _ = self.transport.close();
        self.chain = None;
        self.progress = None;
        self.outstanding = None;

        transition_shared(&self.state, CommunicationState::Disconnected, &self.bus);
        self.emit(PrinterEvent::Connection(ConnectionEvent::Disconnected {
            port: self.port.clone(),
            reason,
        }));

        if !self.params.auto_reconnect || self.reopen.is_none() {
            return false;
        }

        for attempt in 1..=RECONNECT_ATTEMPTS {
            tokio::time::sleep(RECONNECT_DELAY).await;
            if self.shutdown_requested() {
                return false;
            }
            tracing::info!(
                "Reconnect attempt {}/{} to {}",
                attempt,
                RECONNECT_ATTEMPTS,
                self.port
            );
            transition_shared(&self.state, CommunicationState::Connecting, &self.bus);
            self.emit(PrinterEvent::Connection(ConnectionEvent::Connecting {
                port: self.port.clone(),
            }));
            let reopened = match self.reopen.as_ref() {
                Some(reopen) => reopen(),
                None => return false,
            };
            match reopened {
                Ok(transport) => {
                    self.transport = transport;
                    self.reset_session();
                    transition_shared(&self.state, CommunicationState::Connected, &self.bus);
                    self.emit(PrinterEvent::Connection(ConnectionEvent::Connected {
                        port: self.port.clone(),
                    }));
                    return true;
                }
                Err(error) => {
                    tracing::warn!("Reconnect to {} failed: {}", self.port, error);
                    transition_shared(&self.state, CommunicationState::Disconnected, &self.bus);
                    self.emit(PrinterEvent::Connection(ConnectionEvent::ConnectionFailed {
                        port: self.port.clone(),
                        error: error.to_string(),
                    }));
                }
            }
        }
        false
    }

    fn reset_session(&mut self) {
        self.outstanding = None;
        self.history.clear();
        self.line_number = 0;
        self.skip_next_ok = false;
        self.pending_line_reset = self.params.use_checksums;
        self.last_poll = Instant::now();
        *self.pause.write() = PauseState::NotPaused;
    }

    /// Orderly teardown on user request (or connection drop)
    fn shutdown(&mut self) {
        tracing::info!("Disconnecting from {}", self.port);
        let canceled = {
            let mut job = self.job.write();
            match job.as_mut() {
                Some(job) if job.is_active() => {
                    job.mark_canceled();
                    Some(job.percent_done())
                }
                _ => None,
            }
        };
        if let Some(percent) = canceled {
            self.emit(PrinterEvent::Job(JobEvent::Canceled { percent }));
        }
        self.chain = None;
        self.progress = None;
        let _ = self.transport.close();
        transition_shared(&self.state, CommunicationState::Disconnected, &self.bus);
        self.emit(PrinterEvent::Connection(ConnectionEvent::Disconnected {
            port: self.port.clone(),
            reason: DisconnectReason::UserRequested,
        }));
    }

    /// True once the owning connection asked for (or dropped) this worker
    fn shutdown_requested(&mut self) -> bool {
        !matches!(self.shutdown_rx.try_recv(), Err(TryRecvError::Empty))
    }

    fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.params.timeout_ms)
    }

    fn emit(&self, event: PrinterEvent) {
        self.bus.publish(event);
    }
}

/// Value of the first `<letter><number>` word in a command
fn word_value(command: &str, letter: char) -> Option<f64> {
    command
        .split_whitespace()
        .find_map(|word| word.strip_prefix(letter)?.parse().ok())
}
