use std::fmt;

use serde::Serialize;

/// Lifecycle of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Init,
    Registering,
    Trimmed,
    Subtracting,
    WcsPropagating,
    Done,
    Errored,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }

    /// Registering may go straight to Subtracting when a registration failure
    /// is tolerated.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Init, Registering)
                | (Registering, Trimmed)
                | (Registering, Subtracting)
                | (Registering, Errored)
                | (Trimmed, Subtracting)
                | (Subtracting, WcsPropagating)
                | (Subtracting, Errored)
                | (WcsPropagating, Done)
                | (WcsPropagating, Errored)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Registering => write!(f, "REGISTERING"),
            Self::Trimmed => write!(f, "TRIMMED"),
            Self::Subtracting => write!(f, "SUBTRACTING"),
            Self::WcsPropagating => write!(f, "WCS_PROPAGATING"),
            Self::Done => write!(f, "DONE"),
            Self::Errored => write!(f, "ERRORED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineState::*;

    #[test]
    fn test_happy_path_is_allowed() {
        let path = [Init, Registering, Trimmed, Subtracting, WcsPropagating, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        for next in [Init, Registering, Trimmed, Subtracting, WcsPropagating, Done, Errored] {
            assert!(!Done.can_transition_to(next));
            assert!(!Errored.can_transition_to(next));
        }
        assert!(!Init.can_transition_to(Errored));
        assert!(Done.is_terminal() && Errored.is_terminal());
    }
}
