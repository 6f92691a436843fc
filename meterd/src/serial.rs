//! `serialport`-backed implementation of the skstack link traits. The port
//! handle is cloned so the receiver task and the command path own
//! independent halves; blocking reads run with a short timeout and are
//! mapped onto the runtime with `block_in_place`.

use skstack::link::{SerialRead, SerialWrite};
use std::future::Future;
use std::io::{self, Read, Write};
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_secs(1);

pub struct PortReader {
    port: Box<dyn serialport::SerialPort>,
}

pub struct PortWriter {
    port: Box<dyn serialport::SerialPort>,
}

/// Open the port at the factory default speed and split it into the two
/// halves the adapter consumes.
pub fn open(path: &str) -> io::Result<(PortReader, PortWriter)> {
    let port = serialport::new(path, skstack::SERIAL_BAUDRATE)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(io::Error::other)?;
    let reader = port.try_clone().map_err(io::Error::other)?;

    Ok((PortReader { port: reader }, PortWriter { port }))
}

impl SerialRead for PortReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            tokio::task::block_in_place(|| match self.port.read(buf) {
                Ok(count) => Ok(count),
                // The poll interval elapsed without data; report an idle chunk.
                Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
                Err(err) => Err(err),
            })
        }
    }
}

impl SerialWrite for PortWriter {
    fn write_all(&mut self, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        async move { tokio::task::block_in_place(|| self.port.write_all(data)) }
    }

    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()> {
        self.port.set_baud_rate(baud).map_err(io::Error::other)
    }

    fn clear_buffers(&mut self) -> io::Result<()> {
        self.port.clear(serialport::ClearBuffer::All).map_err(io::Error::other)
    }
}
