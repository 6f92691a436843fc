//! ECHONET Lite application protocol: object model, property codecs, the
//! frame codec and the request/response transport pump.

/// UDP port ECHONET Lite nodes listen on.
pub const ECHONET_LITE_PORT: u16 = 3610;

pub mod access;
pub mod code;
pub mod error;
pub mod esv;
pub mod frame;
pub mod object;
pub mod property;
pub mod transport;
