//! Widget command codes

/// Commands understood by the widget firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Echo the payload back unchanged
    Echo,
    /// Transmit a DMX frame: start code followed by up to 512 slots
    TxDmx,
}

impl Command {
    /// Wire code for this command
    pub fn code(&self) -> u16 {
        match self {
            Command::Echo => 0x0080,
            Command::TxDmx => 0x0081,
        }
    }

    /// Look up a command by its wire code
    pub fn from_code(code: u16) -> Option<Command> {
        match code {
            0x0080 => Some(Command::Echo),
            0x0081 => Some(Command::TxDmx),
            _ => None,
        }
    }

    /// Returns a human-readable name for the command
    pub fn name(&self) -> &'static str {
        match self {
            Command::Echo => "Echo",
            Command::TxDmx => "TX DMX",
        }
    }
}

impl From<Command> for u16 {
    fn from(command: Command) -> u16 {
        command.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for cmd in [Command::Echo, Command::TxDmx] {
            assert_eq!(Command::from_code(cmd.code()), Some(cmd));
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(Command::from_code(0x0000), None);
        assert_eq!(Command::from_code(0x0082), None);
    }
}
