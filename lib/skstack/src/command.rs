/// SK commands the adapter issues, plus the product configuration commands
/// that switch the module's line discipline.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SkCommand {
    /// Reset the protocol stack.
    SkReset,
    /// Read or write a virtual register.
    SkSreg,
    /// Report the stack firmware version.
    SkVer,
    /// Derive and store the Route-B IDs from the supplied id.
    SkSetRbid,
    /// Derive and store the PSK from the supplied password.
    SkSetPwd,
    /// Run an active or ED scan.
    SkScan,
    /// Convert a MAC address to its IPv6 link local address.
    SkLl64,
    /// Start the PANA join sequence towards the given address.
    SkJoin,
    /// Request termination of the current PANA session.
    SkTerm,
    /// Send a UDP datagram.
    SkSendTo,
    /// Read the ERXUDP payload display format.
    Ropt,
    /// Write the ERXUDP payload display format.
    Wopt,
    /// Read the UART configuration.
    Ruart,
    /// Write the UART configuration.
    Wuart,
}

impl SkCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            SkCommand::SkReset => "SKRESET",
            SkCommand::SkSreg => "SKSREG",
            SkCommand::SkVer => "SKVER",
            SkCommand::SkSetRbid => "SKSETRBID",
            SkCommand::SkSetPwd => "SKSETPWD",
            SkCommand::SkScan => "SKSCAN",
            SkCommand::SkLl64 => "SKLL64",
            SkCommand::SkJoin => "SKJOIN",
            SkCommand::SkTerm => "SKTERM",
            SkCommand::SkSendTo => "SKSENDTO",
            SkCommand::Ropt => "ROPT",
            SkCommand::Wopt => "WOPT",
            SkCommand::Ruart => "RUART",
            SkCommand::Wuart => "WUART",
        }
    }

    /// The product configuration commands terminate lines with a bare CR;
    /// every SK command uses CRLF.
    #[inline]
    pub fn uses_cr(self) -> bool {
        matches!(self, SkCommand::Ropt | SkCommand::Wopt | SkCommand::Ruart | SkCommand::Wuart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(SkCommand::SkSendTo.as_str(), "SKSENDTO");
        assert_eq!(SkCommand::SkLl64.as_str(), "SKLL64");
    }

    #[test]
    fn test_newline_selection() {
        assert!(SkCommand::Wopt.uses_cr());
        assert!(SkCommand::Ropt.uses_cr());
        assert!(!SkCommand::SkVer.uses_cr());
    }
}
