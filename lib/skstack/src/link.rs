//! Byte-level access to the serial line. The concrete driver lives with the
//! application; the adapter only needs chunked reads on one half and writes
//! plus line speed control on the other.

use std::future::Future;
use std::io;

/// Read half of the serial link, owned by the receiver task.
pub trait SerialRead: Send + 'static {
    /// Read whatever bytes are available into `buf`. A return of 0 means the
    /// driver's poll interval elapsed without data; closure of the port is
    /// reported as an error.
    fn read_chunk(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// Write half of the serial link, owned by the command path.
pub trait SerialWrite: Send {
    /// Write the whole buffer.
    fn write_all(&mut self, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Reconfigure the line speed.
    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()>;

    /// Drop anything buffered by the driver in both directions.
    fn clear_buffers(&mut self) -> io::Result<()>;
}
