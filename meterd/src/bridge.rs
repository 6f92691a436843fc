//! Glue between the radio adapter and the ECHONET transport pump: outbound
//! frames leave through `send_udp` towards the joined meter, inbound frames
//! are the UDP events addressed to the ECHONET Lite port.

use echonet::transport::{MeterReceiver, MeterSender};
use echonet::ECHONET_LITE_PORT;
use skstack::adapter::{CommandChannel, EventStream};
use skstack::event::ModuleEvent;
use skstack::link::SerialWrite;
use std::future::Future;
use std::io;

pub struct MeterUplink<W: SerialWrite> {
    cmd: CommandChannel<W>,
    address: String,
}

impl<W: SerialWrite> MeterUplink<W> {
    pub fn new(cmd: CommandChannel<W>, address: String) -> MeterUplink<W> {
        MeterUplink { cmd, address }
    }
}

impl<W: SerialWrite + 'static> MeterSender for MeterUplink<W> {
    fn send_frame(&mut self, payload: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            self.cmd
                .send_udp(&self.address, ECHONET_LITE_PORT, payload)
                .await
                .map_err(io::Error::other)
        }
    }
}

pub struct MeterDownlink {
    events: EventStream,
}

impl MeterDownlink {
    pub fn new(events: EventStream) -> MeterDownlink {
        MeterDownlink { events }
    }
}

impl MeterReceiver for MeterDownlink {
    fn recv_frame(&mut self) -> impl Future<Output = io::Result<Vec<u8>>> + Send {
        async move {
            loop {
                match self.events.next().await {
                    Some(ModuleEvent::Udp(packet)) if packet.dst_port == ECHONET_LITE_PORT => {
                        return Ok(packet.data);
                    }
                    Some(_) => continue,
                    None => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "serial link closed",
                        ));
                    }
                }
            }
        }
    }
}
