//! The radio adapter: owns the serial line, turns outbound commands into
//! line-framed writes and inbound bytes into three streams: a typed event
//! stream for callers, a single-shot result channel (OK / FAIL xx) and a
//! multi-line response channel filled between command send and result.

use crate::command::SkCommand;
use crate::epan::Epan;
use crate::error::AdapterError;
use crate::event::{Event, EventCode, ModuleEvent, UdpPacket};
use crate::link::{SerialRead, SerialWrite};
use crate::AVAILABLE_BAUDRATES;
use slog::{debug, info, o, trace, warn, Discard, Logger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const RESULT_TIMEOUT: Duration = Duration::from_secs(1);
const RESET_TIMEOUT: Duration = Duration::from_secs(3);
const ECHO_TIMEOUT: Duration = Duration::from_secs(1);
const EVENT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_SCAN_DURATION: u8 = 7;
const UDP_HANDLE: u8 = 1;
const READ_CHUNK_SIZE: usize = 256;

/// How the next received line is interpreted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum RxState {
    Normal,
    PanDescriptor,
    LinkLocal,
    ProductConfig,
}

/// Line terminator currently in effect. SK commands answer in CRLF, the
/// product configuration commands in bare CR.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum NewLine {
    CrLf,
    Cr,
}

impl NewLine {
    #[inline]
    fn bytes(self) -> &'static [u8] {
        match self {
            NewLine::CrLf => b"\r\n",
            NewLine::Cr => b"\r",
        }
    }
}

struct RxBuffer {
    data: Vec<u8>,
    state: RxState,
    newline: NewLine,
}

struct Shared {
    rx: Mutex<RxBuffer>,
    udp_tx_allowed: AtomicBool,
}

struct Queues {
    events: mpsc::UnboundedSender<ModuleEvent>,
    results: mpsc::UnboundedSender<String>,
    responses: mpsc::UnboundedSender<String>,
}

/// Command half of the adapter: the serial writer plus the result/response
/// channels the receiver task feeds.
pub struct CommandChannel<W: SerialWrite> {
    writer: W,
    shared: Arc<Shared>,
    results: mpsc::UnboundedReceiver<String>,
    responses: mpsc::UnboundedReceiver<String>,
    pushback: Option<String>,
    log: Logger,
}

/// Event half of the adapter.
pub struct EventStream {
    events: mpsc::UnboundedReceiver<ModuleEvent>,
    // Keeps the receiver task owned; it exits by itself when the port closes.
    #[allow(dead_code)]
    task: JoinHandle<()>,
}

impl EventStream {
    /// The next module event, in arrival order. `None` once the receiver
    /// task has exited.
    pub async fn next(&mut self) -> Option<ModuleEvent> {
        self.events.recv().await
    }
}

/// The assembled adapter.
pub struct RadioAdapter<W: SerialWrite> {
    cmd: CommandChannel<W>,
    events: EventStream,
}

impl<W: SerialWrite> RadioAdapter<W> {
    /// Spawns the receiver task over `reader` and wires the command path to
    /// `writer`. Must be called from within a tokio runtime.
    pub fn start<'a, R, L>(reader: R, writer: W, log: L) -> RadioAdapter<W>
    where
        R: SerialRead,
        L: Into<Option<&'a Logger>>,
    {
        let log = match log.into() {
            Some(log) => log.new(o!("component" => "skstack")),
            None => Logger::root(Discard, o!()),
        };

        let shared = Arc::new(Shared {
            rx: Mutex::new(RxBuffer {
                data: Vec::new(),
                state: RxState::Normal,
                newline: NewLine::CrLf,
            }),
            udp_tx_allowed: AtomicBool::new(false),
        });

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let queues = Queues { events: event_tx, results: result_tx, responses: response_tx };

        let task = tokio::spawn(run_receiver(reader, shared.clone(), queues, log.clone()));

        RadioAdapter {
            cmd: CommandChannel {
                writer,
                shared,
                results: result_rx,
                responses: response_rx,
                pushback: None,
                log,
            },
            events: EventStream { events: event_rx, task },
        }
    }

    /// Bring the module up: settle the line speed, reset the stack, disable
    /// command echo, force hex UDP payload display and register the Route-B
    /// credentials.
    pub async fn init(&mut self, route_b_id: &str, password: &str) -> Result<(), AdapterError> {
        self.detect_baudrate().await?;

        self.cmd
            .send_command(SkCommand::SkReset, &[], None, RESET_TIMEOUT, true)
            .await?;
        self.cmd
            .send_command(SkCommand::SkSreg, &["SFE", "0"], None, RESULT_TIMEOUT, true)
            .await?;

        let opt = self
            .cmd
            .send_command(SkCommand::Ropt, &[], None, RESULT_TIMEOUT, false)
            .await?;
        if opt.as_deref() != Some("01") {
            self.cmd
                .send_command(SkCommand::Wopt, &["01"], None, RESULT_TIMEOUT, false)
                .await?;
        }

        self.cmd
            .send_command(SkCommand::SkSetRbid, &[route_b_id], None, RESULT_TIMEOUT, false)
            .await?;
        let password_len = format!("{:X}", password.len());
        self.cmd
            .send_command(
                SkCommand::SkSetPwd,
                &[&password_len, password],
                None,
                RESULT_TIMEOUT,
                false,
            )
            .await?;

        Ok(())
    }

    /// Probe the candidate baudrates until SKVER answers. The module
    /// occasionally answers FAIL right after a speed change, so the whole
    /// sweep runs twice before giving up.
    async fn detect_baudrate(&mut self) -> Result<(), AdapterError> {
        info!(self.cmd.log, "probing line speed");

        for sweep in 0..2 {
            for &baud in AVAILABLE_BAUDRATES.iter() {
                debug!(self.cmd.log, "testing baudrate"; "baud" => baud, "sweep" => sweep);

                if self.cmd.writer.set_baud_rate(baud).is_err() {
                    continue;
                }
                self.cmd.clear_line_buffer();
                if self.cmd.writer.write_all(b"\r\n").await.is_err() {
                    continue;
                }
                let _ = self.cmd.writer.clear_buffers();

                match self
                    .cmd
                    .send_command(SkCommand::SkVer, &[], None, RESULT_TIMEOUT, true)
                    .await
                {
                    Ok(Some(response)) if response.starts_with("EVER") => {
                        info!(self.cmd.log, "line speed settled"; "baud" => baud);
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }

        Err(AdapterError::BaudrateNotFound)
    }

    /// Run active scans of increasing duration until a beacon answers,
    /// returning the latest complete descriptor observed.
    pub async fn scan(&mut self, initial_duration: u8) -> Result<Option<Epan>, AdapterError> {
        let mut duration = initial_duration;
        let mut found: Option<Epan> = None;

        info!(self.cmd.log, "starting active scan"; "duration" => duration);

        while duration <= MAX_SCAN_DURATION {
            let duration_arg = duration.to_string();
            self.cmd
                .send_command(
                    SkCommand::SkScan,
                    &["2", "FFFFFFFF", &duration_arg],
                    None,
                    RESULT_TIMEOUT,
                    false,
                )
                .await?;

            loop {
                match timeout(EVENT_TIMEOUT, self.events.next()).await {
                    Ok(Some(ModuleEvent::PanDescriptor(epan))) => found = Some(epan),
                    Ok(Some(ModuleEvent::Event(event)))
                        if event.code == EventCode::ActiveScanDone =>
                    {
                        break;
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => return Err(AdapterError::LinkClosed),
                    Err(_) => break,
                }
            }

            if found.is_some() {
                return Ok(found);
            }

            duration += 1;
            debug!(self.cmd.log, "no beacon, extending scan"; "duration" => duration);
        }

        Ok(found)
    }

    /// PANA-join the PAN described by `epan` and return the meter's link
    /// local address.
    pub async fn join(&mut self, epan: &Epan) -> Result<String, AdapterError> {
        let channel = epan.channel.ok_or(AdapterError::IncompleteDescriptor)?;
        let pan_id = epan.pan_id.ok_or(AdapterError::IncompleteDescriptor)?;
        let mac = epan.mac_address.as_deref().ok_or(AdapterError::IncompleteDescriptor)?;

        let channel_arg = format!("{:X}", channel);
        self.cmd
            .send_command(SkCommand::SkSreg, &["S2", &channel_arg], None, RESULT_TIMEOUT, false)
            .await?;
        let pan_arg = format!("{:X}", pan_id);
        self.cmd
            .send_command(SkCommand::SkSreg, &["S3", &pan_arg], None, RESULT_TIMEOUT, false)
            .await?;

        let address = self
            .cmd
            .send_command(SkCommand::SkLl64, &[mac], None, RESULT_TIMEOUT, false)
            .await?
            .ok_or(AdapterError::Protocol("SKLL64 returned no address"))?;

        info!(self.cmd.log, "joining pan"; "address" => %address, "channel" => channel);

        self.cmd
            .send_command(SkCommand::SkJoin, &[&address], None, RESULT_TIMEOUT, false)
            .await?;

        loop {
            match timeout(EVENT_TIMEOUT, self.events.next()).await {
                Ok(Some(ModuleEvent::Event(event))) => match event.code {
                    EventCode::PanaConnectDone => {
                        info!(self.cmd.log, "pana session established"; "address" => %address);
                        return Ok(address);
                    }
                    EventCode::PanaConnectError => return Err(AdapterError::PanaConnect),
                    _ => {}
                },
                Ok(Some(_)) => {}
                Ok(None) => return Err(AdapterError::LinkClosed),
                Err(_) => return Err(AdapterError::Timeout("pana connect")),
            }
        }
    }

    /// Ask the module to end the current PANA session.
    pub async fn terminate(&mut self) -> Result<(), AdapterError> {
        self.cmd
            .send_command(SkCommand::SkTerm, &[], None, RESULT_TIMEOUT, false)
            .await?;
        Ok(())
    }

    /// Send a UDP datagram into the established session.
    pub async fn send_udp(
        &mut self,
        address: &str,
        port: u16,
        payload: &[u8],
    ) -> Result<(), AdapterError> {
        self.cmd.send_udp(address, port, payload).await
    }

    /// The next module event.
    pub async fn next_event(&mut self) -> Option<ModuleEvent> {
        self.events.next().await
    }

    /// Split into the command half and the event stream so they can serve
    /// independent tasks.
    pub fn into_parts(self) -> (CommandChannel<W>, EventStream) {
        (self.cmd, self.events)
    }
}

impl<W: SerialWrite> CommandChannel<W> {
    /// Send a UDP datagram. Permitted only between PANA-connect and session
    /// lifetime expiry.
    pub async fn send_udp(
        &mut self,
        address: &str,
        port: u16,
        payload: &[u8],
    ) -> Result<(), AdapterError> {
        if !self.shared.udp_tx_allowed.load(Ordering::SeqCst) {
            return Err(AdapterError::TxProhibited);
        }

        let params = [
            format!("{:X}", UDP_HANDLE),
            address.to_string(),
            format!("{:04X}", port),
            "1".to_string(),
            format!("{:04X}", payload.len()),
        ];
        let params: Vec<&str> = params.iter().map(String::as_str).collect();

        self.send_command(SkCommand::SkSendTo, &params, Some(payload), RESULT_TIMEOUT, false)
            .await?;
        Ok(())
    }

    /// Issue one command line and collect its outcome.
    ///
    /// Both channels are drained first so stale lines from an earlier
    /// exchange cannot leak into this one. The newline mode and RX state are
    /// pre-set from the command, the line (plus optional raw data) written,
    /// an echoed copy optionally discarded, and the single result line
    /// awaited. Response lines accumulated in between come back joined by
    /// CRLF.
    async fn send_command(
        &mut self,
        command: SkCommand,
        params: &[&str],
        data: Option<&[u8]>,
        result_timeout: Duration,
        expect_echo: bool,
    ) -> Result<Option<String>, AdapterError> {
        self.drain();

        let newline = if command.uses_cr() { NewLine::Cr } else { NewLine::CrLf };
        let state = match command {
            SkCommand::SkLl64 => RxState::LinkLocal,
            SkCommand::Ropt | SkCommand::Ruart => RxState::ProductConfig,
            _ => RxState::Normal,
        };
        {
            let mut rx = self.shared.rx.lock().expect("rx buffer poisoned");
            rx.newline = newline;
            rx.state = state;
        }

        let mut line = command.as_str().to_string();
        for param in params {
            line.push(' ');
            line.push_str(param);
        }

        let mut wire = line.clone().into_bytes();
        if let Some(data) = data {
            wire.push(b' ');
            wire.extend_from_slice(data);
        }
        wire.extend_from_slice(newline.bytes());

        trace!(self.log, "issuing command"; "line" => %line);
        self.writer.write_all(&wire).await?;

        if expect_echo {
            self.skip_echo(&line).await;
        }

        let result = match timeout(result_timeout, self.next_result()).await {
            Ok(Some(result)) => result,
            Ok(None) => return Err(AdapterError::LinkClosed),
            Err(_) => return Err(AdapterError::Timeout("command result")),
        };

        if let Some(code) = result.strip_prefix("FAIL") {
            let code = code.trim().to_string();
            warn!(self.log, "command failed"; "line" => %line, "code" => %code);
            return Err(AdapterError::Command { code });
        }

        let mut lines = Vec::new();
        while let Some(response) = self.try_next_response() {
            lines.push(response);
        }

        Ok(if lines.is_empty() { None } else { Some(lines.join("\r\n")) })
    }

    /// Discard the echoed command line if present; anything else is pushed
    /// back for the normal response path.
    async fn skip_echo(&mut self, command_line: &str) {
        if let Ok(Some(line)) = timeout(ECHO_TIMEOUT, self.next_response()).await {
            if line != command_line {
                self.pushback = Some(line);
            }
        }
    }

    async fn next_result(&mut self) -> Option<String> {
        self.results.recv().await
    }

    async fn next_response(&mut self) -> Option<String> {
        if let Some(line) = self.pushback.take() {
            return Some(line);
        }
        self.responses.recv().await
    }

    fn try_next_response(&mut self) -> Option<String> {
        if let Some(line) = self.pushback.take() {
            return Some(line);
        }
        self.responses.try_recv().ok()
    }

    fn drain(&mut self) {
        self.pushback = None;
        while self.results.try_recv().is_ok() {}
        while self.responses.try_recv().is_ok() {}
    }

    fn clear_line_buffer(&self) {
        self.shared.rx.lock().expect("rx buffer poisoned").data.clear();
    }
}

/// The receiver task: append chunks to the shared line buffer, split off
/// complete lines on the active terminator and classify each one.
async fn run_receiver<R: SerialRead>(
    mut reader: R,
    shared: Arc<Shared>,
    queues: Queues,
    log: Logger,
) {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut pan: Option<Epan> = None;

    loop {
        let count = match reader.read_chunk(&mut chunk).await {
            Ok(count) => count,
            Err(err) => {
                debug!(log, "receiver task stopping"; "error" => %err);
                break;
            }
        };
        if count == 0 {
            continue;
        }

        let mut lines = Vec::new();
        {
            let mut rx = shared.rx.lock().expect("rx buffer poisoned");
            rx.data.extend_from_slice(&chunk[..count]);
            let terminator = rx.newline.bytes();
            while let Some(position) = find_terminator(&rx.data, terminator) {
                let mut line: Vec<u8> = rx.data.drain(..position + terminator.len()).collect();
                line.truncate(position);
                lines.push(line);
            }
        }

        for raw in lines {
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim();
            if line.is_empty() {
                continue;
            }
            trace!(log, "rx line"; "line" => line);
            process_line(line, &shared, &queues, &mut pan, &log);
        }
    }
}

#[inline]
fn find_terminator(data: &[u8], terminator: &[u8]) -> Option<usize> {
    data.windows(terminator.len()).position(|window| window == terminator)
}

fn process_line(
    line: &str,
    shared: &Shared,
    queues: &Queues,
    pan: &mut Option<Epan>,
    log: &Logger,
) {
    let state = shared.rx.lock().expect("rx buffer poisoned").state;

    match state {
        RxState::Normal => classify_normal(line, shared, queues, pan, log),
        RxState::PanDescriptor => {
            collect_pan_descriptor(line, shared, queues, pan, log);
        }
        RxState::LinkLocal => {
            if line.starts_with("FAIL") {
                send(&queues.results, line);
            } else {
                send(&queues.responses, line);
                send(&queues.results, "OK");
            }
            set_state(shared, RxState::Normal);
        }
        RxState::ProductConfig => {
            if let Some(payload) = line.strip_prefix("OK ") {
                send(&queues.responses, payload.trim());
                send(&queues.results, "OK");
            } else {
                send(&queues.results, line);
            }
            set_state(shared, RxState::Normal);
        }
    }
}

fn classify_normal(
    line: &str,
    shared: &Shared,
    queues: &Queues,
    pan: &mut Option<Epan>,
    log: &Logger,
) {
    if line.starts_with("ERXUDP") {
        match parse_erxudp(line) {
            Some(packet) => {
                let _ = queues.events.send(ModuleEvent::Udp(packet));
            }
            None => warn!(log, "dropping unparsable ERXUDP line"; "line" => line),
        }
    } else if line.starts_with("EPONG")
        || line == "EADDR"
        || line == "ENEIGHBOR"
        || line == "EEDSCAN"
        || line == "EPORT"
    {
        // Recognized tokens with no consumer at this layer.
    } else if line == "EPANDESC" {
        set_state(shared, RxState::PanDescriptor);
        *pan = Some(Epan::default());
    } else if line.starts_with("EVENT") {
        match parse_event(line) {
            Some(event) => {
                match event.code {
                    EventCode::PanaConnectDone => {
                        shared.udp_tx_allowed.store(true, Ordering::SeqCst);
                    }
                    EventCode::SessionLifetimeExpired => {
                        shared.udp_tx_allowed.store(false, Ordering::SeqCst);
                    }
                    _ => {}
                }
                debug!(log, "module event"; "code" => ?event.code, "sender" => %event.sender);
                let _ = queues.events.send(ModuleEvent::Event(event));
            }
            None => warn!(log, "dropping unparsable EVENT line"; "line" => line),
        }
    } else if line.starts_with("OK") || line.starts_with("FAIL") {
        send(&queues.results, line);
    } else {
        send(&queues.responses, line);
    }
}

fn collect_pan_descriptor(
    line: &str,
    shared: &Shared,
    queues: &Queues,
    pan: &mut Option<Epan>,
    log: &Logger,
) {
    let Some((key, value)) = line.split_once(':') else {
        return;
    };
    let Some(epan) = pan.as_mut() else {
        return;
    };
    let key = key.trim();
    let value = value.trim();

    let parsed = match key {
        "Channel" => hex_u8(value).map(|v| epan.channel = Some(v)),
        "Channel Page" => hex_u8(value).map(|v| epan.channel_page = Some(v)),
        "Pan ID" => hex_u16(value).map(|v| epan.pan_id = Some(v)),
        "Addr" => {
            epan.mac_address = Some(value.to_string());
            Some(())
        }
        "LQI" => hex_u8(value).map(|v| epan.lqi = Some(v)),
        "PairID" => {
            epan.pair_id = Some(value.to_string());
            Some(())
        }
        _ => Some(()),
    };
    if parsed.is_none() {
        warn!(log, "dropping unparsable descriptor line"; "line" => line);
        return;
    }

    if epan.is_complete() {
        debug!(log, "pan descriptor complete"; "pan_id" => epan.pan_id, "channel" => epan.channel);
        let _ = queues.events.send(ModuleEvent::PanDescriptor(epan.clone()));
        *pan = None;
        set_state(shared, RxState::Normal);
    }
}

/// `ERXUDP <src> <dst> <sport> <dport> <srcmac> <secured> <len> <payload>`,
/// ports and length in hex, the payload hex-encoded (WOPT 01).
fn parse_erxudp(line: &str) -> Option<UdpPacket> {
    let mut parts = line.split_whitespace();
    parts.next(); // ERXUDP

    let src_addr = parts.next()?.to_string();
    let dst_addr = parts.next()?.to_string();
    let src_port = hex_u16(parts.next()?)?;
    let dst_port = hex_u16(parts.next()?)?;
    let src_mac = parts.next()?.to_string();
    let secured = parts.next()? == "1";
    let length = usize::from_str_radix(parts.next()?, 16).ok()?;
    let data = hex::decode(parts.next()?).ok()?;

    Some(UdpPacket { src_addr, dst_addr, src_port, dst_port, src_mac, secured, length, data })
}

/// `EVENT <code-hex> <sender>`; trailing parameters are ignored.
fn parse_event(line: &str) -> Option<Event> {
    let mut parts = line.split_whitespace();
    parts.next(); // EVENT

    let code = EventCode::from_u8(u8::from_str_radix(parts.next()?, 16).ok()?)?;
    let sender = parts.next().unwrap_or("").to_string();

    Some(Event { code, sender })
}

#[inline]
fn hex_u8(value: &str) -> Option<u8> {
    u8::from_str_radix(value, 16).ok()
}

#[inline]
fn hex_u16(value: &str) -> Option<u16> {
    u16::from_str_radix(value, 16).ok()
}

#[inline]
fn send(queue: &mpsc::UnboundedSender<String>, line: &str) {
    let _ = queue.send(line.to_string());
}

#[inline]
fn set_state(shared: &Shared, state: RxState) {
    shared.rx.lock().expect("rx buffer poisoned").state = state;
}
