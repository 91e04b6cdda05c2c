//! Phases a captured request moves through
//!
//! # Phases
//!
//! - **Init**: the layer has been entered
//! - **FilterCheck**: deciding whether the path is a static asset
//! - **Bypass**: static asset, the downstream stage runs without capture
//! - **Capturing**: the record is started and the request body buffered
//! - **InvokingNext**: the downstream stage is running
//! - **Completed** / **Faulted**: the downstream stage returned or failed
//! - **FinalizingResponse**: the response body is captured and replayed
//! - **Forwarding**: the record is handed to the forwarder
//! - **Done**: terminal, the record can no longer change

use std::fmt;
use tracing::{trace, warn};

/// A phase of the capture lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapturePhase {
    Init,
    FilterCheck,
    Bypass,
    Capturing,
    InvokingNext,
    Completed,
    Faulted,
    FinalizingResponse,
    Forwarding,
    Done,
}

impl CapturePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::FilterCheck => "filter_check",
            Self::Bypass => "bypass",
            Self::Capturing => "capturing",
            Self::InvokingNext => "invoking_next",
            Self::Completed => "completed",
            Self::Faulted => "faulted",
            Self::FinalizingResponse => "finalizing_response",
            Self::Forwarding => "forwarding",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition the lifecycle does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid capture transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: CapturePhase,
    pub to: CapturePhase,
}

/// Tracks one request's progress through [`CapturePhase`]s
#[derive(Debug)]
pub struct Lifecycle {
    phase: CapturePhase,
    bypassed: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: CapturePhase::Init,
            bypassed: false,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    /// Whether this request skipped capture
    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn advance(&mut self, next: CapturePhase) -> Result<(), InvalidTransition> {
        use CapturePhase::*;

        let allowed = match (self.phase, next) {
            (Init, FilterCheck) => true,
            (FilterCheck, Bypass | Capturing) => true,
            (Bypass | Capturing, InvokingNext) => true,
            (InvokingNext, Done) => self.bypassed,
            (InvokingNext, Completed | Faulted) => !self.bypassed,
            (Completed | Faulted, FinalizingResponse) => true,
            (FinalizingResponse, Forwarding) => true,
            (Forwarding, Done) => true,
            _ => false,
        };

        if !allowed {
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }

        trace!(from = %self.phase, to = %next, "capture phase");
        if next == Bypass {
            self.bypassed = true;
        }
        self.phase = next;
        Ok(())
    }

    /// Advance, logging instead of failing when the transition is rejected
    ///
    /// The request path never aborts on lifecycle bookkeeping.
    pub(crate) fn step(&mut self, next: CapturePhase) {
        if let Err(err) = self.advance(next) {
            warn!(error = %err, "capture lifecycle out of order");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::CapturePhase::*;

    fn walk(phases: &[CapturePhase]) -> Result<Lifecycle, InvalidTransition> {
        let mut lifecycle = Lifecycle::new();
        for phase in phases {
            lifecycle.advance(*phase)?;
        }
        Ok(lifecycle)
    }

    #[test]
    fn test_completed_path() {
        let lifecycle = walk(&[
            FilterCheck,
            Capturing,
            InvokingNext,
            Completed,
            FinalizingResponse,
            Forwarding,
            Done,
        ])
        .unwrap();
        assert_eq!(lifecycle.phase(), Done);
        assert!(!lifecycle.is_bypassed());
    }

    #[test]
    fn test_faulted_path_still_forwards() {
        let lifecycle = walk(&[
            FilterCheck,
            Capturing,
            InvokingNext,
            Faulted,
            FinalizingResponse,
            Forwarding,
            Done,
        ])
        .unwrap();
        assert_eq!(lifecycle.phase(), Done);
    }

    #[test]
    fn test_bypass_path_skips_forwarding() {
        let lifecycle = walk(&[FilterCheck, Bypass, InvokingNext, Done]).unwrap();
        assert!(lifecycle.is_bypassed());

        let err = walk(&[FilterCheck, Bypass, InvokingNext, Completed]).unwrap_err();
        assert_eq!(err, InvalidTransition { from: InvokingNext, to: Completed });
    }

    #[test]
    fn test_captured_request_cannot_finish_without_forwarding() {
        let err = walk(&[FilterCheck, Capturing, InvokingNext, Done]).unwrap_err();
        assert_eq!(err.to, Done);
    }

    #[test]
    fn test_done_is_terminal() {
        let mut lifecycle = walk(&[FilterCheck, Bypass, InvokingNext, Done]).unwrap();
        for phase in [Init, FilterCheck, Capturing, Forwarding, Done] {
            assert!(lifecycle.advance(phase).is_err());
        }
        assert_eq!(lifecycle.phase(), Done);
    }

    #[test]
    fn test_forwarding_cannot_be_entered_twice() {
        let mut lifecycle = walk(&[
            FilterCheck,
            Capturing,
            InvokingNext,
            Completed,
            FinalizingResponse,
            Forwarding,
        ])
        .unwrap();
        assert!(lifecycle.advance(Forwarding).is_err());
    }

    #[test]
    fn test_step_tolerates_bad_transitions() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.step(Done);
        assert_eq!(lifecycle.phase(), Init);
    }

    #[test]
    fn test_error_message_names_both_phases() {
        let err = Lifecycle::new().advance(Forwarding).unwrap_err();
        assert_eq!(err.to_string(), "invalid capture transition init -> forwarding");
    }
}
