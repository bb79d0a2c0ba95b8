//! Platform power and lifecycle signals.

use std::fmt;
use std::str::FromStr;

use phantomvault_common::Error;

/// Discrete events delivered by the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemSignal {
    LockScreen,
    Suspend,
    Shutdown,
    BeforeQuit,
}

impl SystemSignal {
    /// True if the event must be held until relocking completes.
    pub fn is_deferrable(self) -> bool {
        matches!(self, SystemSignal::Shutdown | SystemSignal::BeforeQuit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SystemSignal::LockScreen => "lock-screen",
            SystemSignal::Suspend => "suspend",
            SystemSignal::Shutdown => "shutdown",
            SystemSignal::BeforeQuit => "before-quit",
        }
    }
}

impl fmt::Display for SystemSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemSignal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lock-screen" => Ok(SystemSignal::LockScreen),
            "suspend" => Ok(SystemSignal::Suspend),
            "shutdown" => Ok(SystemSignal::Shutdown),
            "before-quit" => Ok(SystemSignal::BeforeQuit),
            other => Err(Error::Validation(format!("Unknown system signal: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferrable_signals() {
        assert!(SystemSignal::Shutdown.is_deferrable());
        assert!(SystemSignal::BeforeQuit.is_deferrable());
        assert!(!SystemSignal::LockScreen.is_deferrable());
        assert!(!SystemSignal::Suspend.is_deferrable());
    }

    #[test]
    fn test_parse_matches_display() {
        for signal in [
            SystemSignal::LockScreen,
            SystemSignal::Suspend,
            SystemSignal::Shutdown,
            SystemSignal::BeforeQuit,
        ] {
            assert_eq!(signal.to_string().parse::<SystemSignal>().unwrap(), signal);
        }
        assert!("reboot".parse::<SystemSignal>().is_err());
    }
}
