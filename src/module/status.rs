//! Engine lifecycle status.

/// Represents the current status of a repeater engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Engine is consuming packets.
    Running,

    /// Engine has stopped and released its sockets.
    Stopped,
}

impl ModuleStatus {
    /// Returns `true` if the engine is running.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` if the engine is stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(ModuleStatus::Running.is_healthy());
        assert!(!ModuleStatus::Stopped.is_healthy());
        assert!(ModuleStatus::Stopped.is_stopped());
        assert!(!ModuleStatus::Running.is_stopped());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ModuleStatus::Running.to_string(), "running");
        assert_eq!(ModuleStatus::Stopped.to_string(), "stopped");
    }
}
