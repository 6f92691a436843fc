use crate::esv::EnetService;
use std::error::Error;
use std::fmt;
use std::io;

/// Error raised while encoding or decoding a single property EDT payload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CodecError {
    /// The payload length does not match the property layout.
    Length { expected: usize, got: usize },
    /// The payload ended before all fields could be read.
    Truncated,
    /// A field carried a value outside its legal range.
    Value(&'static str),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecError::Length { expected, got } => {
                write!(f, "invalid payload length: expected {} bytes, got {}", expected, got)
            }
            CodecError::Truncated => write!(f, "unexpected end of payload"),
            CodecError::Value(reason) => write!(f, "invalid field value: {}", reason),
        }
    }
}

impl Error for CodecError {}

impl From<io::Error> for CodecError {
    #[inline]
    fn from(_: io::Error) -> Self {
        CodecError::Truncated
    }
}

/// Error raised while encoding or decoding a whole frame.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FrameError {
    /// The datagram is shorter than the fixed 12 byte header.
    TooShort(usize),
    /// EHD1/EHD2 do not identify an ECHONET Lite format 1 frame.
    Header { ehd1: u8, ehd2: u8 },
    /// The service byte is not a known ESV code.
    UnknownService(u8),
    /// A property tuple ran past the end of the datagram.
    TruncatedProperty { index: u8 },
    /// Bytes remained after all OPC tuples were consumed.
    TrailingBytes(usize),
    /// A property was attached to a service that does not permit its access rules.
    AccessViolation { epc: u8, service: EnetService },
    /// A property produced an EDT that cannot be framed.
    Codec(CodecError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::TooShort(len) => {
                write!(f, "frame too short: expected at least 12 bytes, got {}", len)
            }
            FrameError::Header { ehd1, ehd2 } => {
                write!(f, "not an ECHONET Lite format 1 frame: EHD {:02X} {:02X}", ehd1, ehd2)
            }
            FrameError::UnknownService(esv) => write!(f, "unknown service code 0x{:02X}", esv),
            FrameError::TruncatedProperty { index } => {
                write!(f, "frame ended inside property tuple {}", index)
            }
            FrameError::TrailingBytes(count) => {
                write!(f, "{} bytes left after the last property tuple", count)
            }
            FrameError::AccessViolation { epc, service } => {
                write!(f, "EPC 0x{:02X} is not accessible through {:?}", epc, service)
            }
            FrameError::Codec(err) => write!(f, "property codec failure: {}", err),
        }
    }
}

impl Error for FrameError {}

impl From<CodecError> for FrameError {
    #[inline]
    fn from(err: CodecError) -> Self {
        FrameError::Codec(err)
    }
}
