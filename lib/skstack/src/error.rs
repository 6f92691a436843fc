use std::error::Error;
use std::fmt;
use std::io;

/// Failures surfaced by the radio adapter.
#[derive(Debug)]
pub enum AdapterError {
    /// The module answered a command with `FAIL <code>`.
    Command { code: String },
    /// UDP transmission attempted outside an established PANA session.
    TxProhibited,
    /// The module reported a PANA connection failure during join.
    PanaConnect,
    /// An external wait ran out; the payload names the operation.
    Timeout(&'static str),
    /// No probed line speed produced a valid SKVER answer.
    BaudrateNotFound,
    /// The scan descriptor is missing fields required for the operation.
    IncompleteDescriptor,
    /// The module answered with something the protocol does not allow.
    Protocol(&'static str),
    /// The serial link (and with it the receiver task) has gone away.
    LinkClosed,
    Io(io::Error),
}

impl AdapterError {
    /// Human readable explanation of a module FAIL code.
    pub fn command_message(code: &str) -> &'static str {
        match code {
            "ER04" => "the specified command is not supported",
            "ER05" => "the number of arguments is incorrect",
            "ER06" => "an argument is out of format or range",
            "ER09" => "UART input error",
            "ER10" => "the command was accepted but execution failed",
            _ => "unknown command error",
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AdapterError::Command { code } => {
                write!(f, "command failed ({}): {}", code, AdapterError::command_message(code))
            }
            AdapterError::TxProhibited => {
                write!(f, "UDP transmission is prohibited outside a PANA session")
            }
            AdapterError::PanaConnect => write!(f, "PANA connection failed"),
            AdapterError::Timeout(what) => write!(f, "timed out waiting for {}", what),
            AdapterError::BaudrateNotFound => write!(f, "no valid baudrate found"),
            AdapterError::IncompleteDescriptor => {
                write!(f, "scan descriptor is missing required fields")
            }
            AdapterError::Protocol(what) => write!(f, "protocol violation: {}", what),
            AdapterError::LinkClosed => write!(f, "serial link closed"),
            AdapterError::Io(err) => write!(f, "serial I/O error: {}", err),
        }
    }
}

impl Error for AdapterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AdapterError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for AdapterError {
    #[inline]
    fn from(err: io::Error) -> Self {
        AdapterError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_messages() {
        assert_eq!(
            AdapterError::command_message("ER04"),
            "the specified command is not supported"
        );
        assert_eq!(AdapterError::command_message("ER99"), "unknown command error");
    }

    #[test]
    fn test_display_includes_code() {
        let err = AdapterError::Command { code: "ER06".into() };

        assert!(err.to_string().contains("ER06"));
        assert!(err.to_string().contains("out of format"));
    }
}
