//! Shared driver types.

/// Why a driver returned control to the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverOutcome {
    /// Hand control to the other driver.
    Switch,
    /// The session is done; tear everything down.
    Exit,
}

impl DriverOutcome {
    /// Wire/log name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Exit => "exit",
        }
    }
}
