//! Request/response pump between callers and the radio link.
//!
//! Outbound requests are encoded and fragmented against the packet size
//! limit the radio reports, each packet tagged with a fresh transaction id.
//! Packets of services that elicit a reply park a completion signal in the
//! pending table and the transmit task waits on it; the receive task decodes
//! every inbound datagram, fires the matching signal, and acknowledges InfC
//! change notifications on the sender's behalf.

use crate::error::FrameError;
use crate::esv::EnetService;
use crate::frame::{self, EchonetRequest, EchonetResponse, FrameEncoder, TransactionId};
use crate::object::ObjectHeader;
use hashbrown::HashMap;
use slog::{debug, error, o, warn, Discard, Logger};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one encoded frame as a UDP payload towards the meter.
pub trait MeterSender: Send + 'static {
    fn send_frame(&mut self, payload: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
}

/// Yields the next UDP payload received from the meter.
pub trait MeterReceiver: Send + 'static {
    fn recv_frame(&mut self) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Largest packet the radio accepts, supplied by the radio layer.
    pub packet_size_limit: usize,
    /// How long a Get/SetC packet waits for its reply.
    pub response_timeout: Duration,
    /// Reject properties whose access rules do not fit the service.
    pub strict_access: bool,
}

impl TransportConfig {
    pub fn new(packet_size_limit: usize) -> TransportConfig {
        TransportConfig {
            packet_size_limit,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            strict_access: true,
        }
    }
}

/// The pump's tasks have stopped and no more requests can be queued.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TransportClosed;

impl fmt::Display for TransportClosed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "transport tasks have shut down")
    }
}

impl Error for TransportClosed {}

type PendingMap = Arc<Mutex<HashMap<u16, Arc<Notify>>>>;

/// Handle to the running transmit/receive tasks.
pub struct Transport {
    requests: mpsc::UnboundedSender<EchonetRequest>,
    responses: mpsc::UnboundedReceiver<EchonetResponse>,
    transmit_task: JoinHandle<()>,
    receive_task: JoinHandle<()>,
}

impl Transport {
    /// Spawn the pump over the supplied link halves. Must be called from
    /// within a tokio runtime.
    pub fn start<'a, S, R, L>(sender: S, receiver: R, config: TransportConfig, log: L) -> Transport
    where
        S: MeterSender,
        R: MeterReceiver,
        L: Into<Option<&'a Logger>>,
    {
        let log = match log.into() {
            Some(log) => log.new(o!("component" => "transport")),
            None => Logger::root(Discard, o!()),
        };

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let transmit_task = tokio::spawn(run_transmit(
            sender,
            request_rx,
            pending.clone(),
            config.clone(),
            log.clone(),
        ));
        let receive_task = tokio::spawn(run_receive(
            receiver,
            response_tx,
            request_tx.clone(),
            pending,
            log,
        ));

        Transport {
            requests: request_tx,
            responses: response_rx,
            transmit_task,
            receive_task,
        }
    }

    /// Queue a request for transmission.
    pub fn send(&self, request: EchonetRequest) -> Result<(), TransportClosed> {
        self.requests.send(request).map_err(|_| TransportClosed)
    }

    /// The next decoded frame, in arrival order. `None` once the receive
    /// task has stopped.
    pub async fn recv(&mut self) -> Option<EchonetResponse> {
        self.responses.recv().await
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.transmit_task.abort();
        self.receive_task.abort();
    }
}

async fn run_transmit<S: MeterSender>(
    mut sender: S,
    mut requests: mpsc::UnboundedReceiver<EchonetRequest>,
    pending: PendingMap,
    config: TransportConfig,
    log: Logger,
) {
    let mut tid = TransactionId::new();

    while let Some(request) = requests.recv().await {
        let service = request.service;
        let mut encoder = FrameEncoder::new(
            ObjectHeader::new(request.src, request.dst),
            service,
            Some(config.packet_size_limit),
        );
        // Auto-generated InfC acknowledgements echo properties that rarely
        // carry the announcement rule themselves.
        if !config.strict_access || service == EnetService::InfCRes {
            encoder = encoder.accept_any_access();
        }

        if let Err(err) = queue_properties(&mut encoder, request.properties) {
            error!(log, "request rejected"; "service" => ?service, "error" => %err);
            continue;
        }

        let packets = match request.transaction_id {
            Some(fixed) => {
                let mut pinned = TransactionId::starting_at(fixed);
                encoder.make(&mut pinned)
            }
            None => encoder.make(&mut tid),
        };
        let packets = match packets {
            Ok(packets) => packets,
            Err(err) => {
                error!(log, "request failed to encode"; "service" => ?service, "error" => %err);
                continue;
            }
        };

        for (packet_tid, bytes) in packets {
            if service.expects_response() {
                let signal = Arc::new(Notify::new());
                pending
                    .lock()
                    .expect("pending map poisoned")
                    .insert(packet_tid, signal.clone());

                if let Err(err) = sender.send_frame(&bytes).await {
                    error!(log, "send failed"; "tid" => packet_tid, "error" => %err);
                    pending.lock().expect("pending map poisoned").remove(&packet_tid);
                    continue;
                }

                if timeout(config.response_timeout, signal.notified()).await.is_err() {
                    warn!(log, "response wait timed out"; "tid" => packet_tid, "service" => ?service);
                }
                pending.lock().expect("pending map poisoned").remove(&packet_tid);
            } else if let Err(err) = sender.send_frame(&bytes).await {
                error!(log, "send failed"; "tid" => packet_tid, "error" => %err);
            }
        }
    }

    debug!(log, "transmit task stopped");
}

fn queue_properties(
    encoder: &mut FrameEncoder,
    properties: Vec<crate::property::Property>,
) -> Result<(), FrameError> {
    for property in properties {
        encoder.add(property)?;
    }
    Ok(())
}

async fn run_receive<R: MeterReceiver>(
    mut receiver: R,
    responses: mpsc::UnboundedSender<EchonetResponse>,
    requests: mpsc::UnboundedSender<EchonetRequest>,
    pending: PendingMap,
    log: Logger,
) {
    loop {
        let payload = match receiver.recv_frame().await {
            Ok(payload) => payload,
            Err(err) => {
                debug!(log, "receive task stopping"; "error" => %err);
                break;
            }
        };

        let response = match frame::decode(&payload) {
            Ok(response) => response,
            Err(err) => {
                warn!(log, "dropping undecodable frame"; "length" => payload.len(), "error" => %err);
                continue;
            }
        };

        // Wake the waiter without touching its pending slot; the transmit
        // task owns the map.
        if let Some(signal) =
            pending.lock().expect("pending map poisoned").get(&response.transaction_id)
        {
            signal.notify_one();
        }

        if response.service == EnetService::InfC {
            let reply = EchonetRequest {
                src: response.dst,
                dst: response.src,
                service: EnetService::InfCRes,
                properties: response.properties.clone(),
                transaction_id: Some(response.transaction_id),
            };
            if requests.send(reply).is_err() {
                debug!(log, "transmit queue gone, dropping InfC acknowledgement");
            }
        }

        if responses.send(response).is_err() {
            debug!(log, "response consumer gone, receive task stopping");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Access;
    use crate::code::DeviceClass;
    use crate::frame::decode;
    use crate::object::EnetObject;
    use crate::property::{MomentPower, OpStatus, Property};

    struct MockUplink {
        frames: mpsc::UnboundedSender<Vec<u8>>,
    }

    impl MeterSender for MockUplink {
        fn send_frame(&mut self, payload: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
            let result = self
                .frames
                .send(payload.to_vec())
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe));
            async move { result }
        }
    }

    struct MockDownlink {
        frames: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    impl MeterReceiver for MockDownlink {
        fn recv_frame(&mut self) -> impl Future<Output = io::Result<Vec<u8>>> + Send {
            async move {
                self.frames
                    .recv()
                    .await
                    .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
            }
        }
    }

    struct Harness {
        transport: Transport,
        sent: mpsc::UnboundedReceiver<Vec<u8>>,
        inbound: mpsc::UnboundedSender<Vec<u8>>,
    }

    fn harness(config: TransportConfig) -> Harness {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let transport = Transport::start(
            MockUplink { frames: sent_tx },
            MockDownlink { frames: inbound_rx },
            config,
            None,
        );

        Harness { transport, sent: sent_rx, inbound: inbound_tx }
    }

    fn controller() -> EnetObject {
        EnetObject::new(DeviceClass::Controller, 0x01)
    }

    fn meter() -> EnetObject {
        EnetObject::new(DeviceClass::LowVoltageSmartMeter, 0x01)
    }

    fn get_request() -> EchonetRequest {
        EchonetRequest::new(
            controller(),
            meter(),
            EnetService::Get,
            vec![Property::MomentPower(MomentPower::default())],
        )
    }

    // GetRes frames are hand-assembled: the encoder is controller-side and
    // GET mode payloads are always empty.
    fn get_response(tid: u16, watts: i32) -> Vec<u8> {
        let mut out = vec![0x10, 0x81];
        out.extend_from_slice(&tid.to_be_bytes());
        out.extend_from_slice(&[0x02, 0x88, 0x01, 0x05, 0xFF, 0x01, 0x72, 0x01, 0xE7, 0x04]);
        out.extend_from_slice(&watts.to_be_bytes());
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_response_correlation() {
        let mut harness = harness(TransportConfig::new(1232));

        harness.transport.send(get_request()).unwrap();

        let sent = harness.sent.recv().await.unwrap();
        let sent_frame = decode(&sent).unwrap();
        assert_eq!(sent_frame.transaction_id, 0);
        assert_eq!(sent_frame.service, EnetService::Get);

        harness.inbound.send(get_response(0, 950)).unwrap();

        let response = harness.transport.recv().await.unwrap();
        assert_eq!(response.transaction_id, 0);
        assert_eq!(
            response.properties,
            vec![Property::MomentPower(MomentPower { value: Some(950) })]
        );

        // The pending slot released; the next request goes straight out with
        // the following transaction id.
        harness.transport.send(get_request()).unwrap();
        let sent = harness.sent.recv().await.unwrap();
        assert_eq!(decode(&sent).unwrap().transaction_id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_timeout_releases_pump() {
        let mut config = TransportConfig::new(1232);
        config.response_timeout = Duration::from_millis(50);
        let mut harness = harness(config);

        harness.transport.send(get_request()).unwrap();
        let _ = harness.sent.recv().await.unwrap();

        // No reply arrives; after the timeout the pump must move on to the
        // next request.
        harness.transport.send(get_request()).unwrap();
        let sent = harness.sent.recv().await.unwrap();
        assert_eq!(decode(&sent).unwrap().transaction_id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_infc_auto_acknowledgement() {
        let mut harness = harness(TransportConfig::new(1232));

        let mut encoder =
            FrameEncoder::new(ObjectHeader::new(meter(), controller()), EnetService::InfC, None)
                .accept_any_access();
        encoder.add(Property::OpStatus(OpStatus { on: true })).unwrap();
        let mut counter = TransactionId::starting_at(0x1234);
        let notification = encoder.make(&mut counter).unwrap().remove(0).1;

        harness.inbound.send(notification).unwrap();

        // The notification surfaces to the caller...
        let response = harness.transport.recv().await.unwrap();
        assert_eq!(response.service, EnetService::InfC);

        // ...and the acknowledgement goes out with the same transaction id,
        // swapped objects and the echoed property list.
        let ack = harness.sent.recv().await.unwrap();
        let ack_frame = decode(&ack).unwrap();
        assert_eq!(ack_frame.transaction_id, 0x1234);
        assert_eq!(ack_frame.service, EnetService::InfCRes);
        assert_eq!(ack_frame.src, controller());
        assert_eq!(ack_frame.dst, meter());
        assert_eq!(ack_frame.properties, vec![Property::OpStatus(OpStatus { on: true })]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_access_drops_request() {
        let mut harness = harness(TransportConfig::new(1232));

        // SetI with a GET-only property is rejected before transmission.
        let rejected = EchonetRequest::new(
            controller(),
            meter(),
            EnetService::SetI,
            vec![Property::MomentPower(MomentPower::default())],
        );
        harness.transport.send(rejected).unwrap();

        // The next valid request is the first thing on the wire.
        harness.transport.send(get_request()).unwrap();
        let sent = harness.sent.recv().await.unwrap();
        assert_eq!(decode(&sent).unwrap().service, EnetService::Get);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_and_forget_does_not_wait() {
        let mut harness = harness(TransportConfig::new(1232));

        let set_i = EchonetRequest::new(
            controller(),
            meter(),
            EnetService::SetI,
            vec![Property::OpStatus(OpStatus { on: false })],
        );
        harness.transport.send(set_i).unwrap();
        harness.transport.send(get_request()).unwrap();

        // Both frames appear without any reply being fed.
        let first = decode(&harness.sent.recv().await.unwrap()).unwrap();
        let second = decode(&harness.sent.recv().await.unwrap()).unwrap();
        assert_eq!(first.service, EnetService::SetI);
        assert_eq!(second.service, EnetService::Get);
    }

    #[test]
    fn test_encode_mode_matches_service_table() {
        // Spot check the mapping the pump relies on.
        assert_eq!(EnetService::InfCRes.allowed_access(), Access::ANNO);
        assert!(!EnetService::InfCRes.expects_response());
    }
}
