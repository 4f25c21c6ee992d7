//! Switch state machine
//!
//! Tracks one attempt to move "active" status to a new endpoint, from request
//! to completion or failure.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::registry::EndpointId;

/// Switch lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchPhase {
    /// Accepted, nothing issued yet
    Idle,
    /// Checking the target is healthy
    Validating,
    /// Asking the source endpoint to settle
    Preparing,
    /// Commit issued; no way back from here
    Switching,
    /// Waiting for the switch to settle
    Verifying,
    /// Switch finished
    Complete,
    /// Switch failed or was cancelled
    Failed,
}

impl SwitchPhase {
    /// Next phase on the success path
    pub fn next(self) -> Option<SwitchPhase> {
        match self {
            SwitchPhase::Idle => Some(SwitchPhase::Validating),
            SwitchPhase::Validating => Some(SwitchPhase::Preparing),
            SwitchPhase::Preparing => Some(SwitchPhase::Switching),
            SwitchPhase::Switching => Some(SwitchPhase::Verifying),
            SwitchPhase::Verifying => Some(SwitchPhase::Complete),
            SwitchPhase::Complete | SwitchPhase::Failed => None,
        }
    }

    /// Progress reported to observers on entering this phase
    pub fn percent(self) -> Option<u8> {
        match self {
            SwitchPhase::Validating => Some(10),
            SwitchPhase::Preparing => Some(30),
            SwitchPhase::Switching => Some(60),
            SwitchPhase::Verifying => Some(90),
            SwitchPhase::Complete => Some(100),
            SwitchPhase::Idle | SwitchPhase::Failed => None,
        }
    }

    /// Check if the switch can still be cancelled in this phase
    pub fn is_cancellable(self) -> bool {
        matches!(self, SwitchPhase::Validating | SwitchPhase::Preparing)
    }

    /// Check if this phase ends the switch
    pub fn is_terminal(self) -> bool {
        matches!(self, SwitchPhase::Complete | SwitchPhase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SwitchPhase::Idle => "idle",
            SwitchPhase::Validating => "validating",
            SwitchPhase::Preparing => "preparing",
            SwitchPhase::Switching => "switching",
            SwitchPhase::Verifying => "verifying",
            SwitchPhase::Complete => "complete",
            SwitchPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SwitchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time spent in each phase (serialized in milliseconds)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PhaseDurations {
    #[serde(serialize_with = "as_millis")]
    pub validating: Option<Duration>,
    #[serde(serialize_with = "as_millis")]
    pub preparing: Option<Duration>,
    #[serde(serialize_with = "as_millis")]
    pub switching: Option<Duration>,
    #[serde(serialize_with = "as_millis")]
    pub verifying: Option<Duration>,
    #[serde(serialize_with = "as_millis")]
    pub total: Option<Duration>,
}

impl PhaseDurations {
    /// Record the time spent in a phase
    pub fn set(&mut self, phase: SwitchPhase, elapsed: Duration) {
        match phase {
            SwitchPhase::Validating => self.validating = Some(elapsed),
            SwitchPhase::Preparing => self.preparing = Some(elapsed),
            SwitchPhase::Switching => self.switching = Some(elapsed),
            SwitchPhase::Verifying => self.verifying = Some(elapsed),
            _ => {}
        }
    }

    /// Time recorded for a phase
    pub fn get(&self, phase: SwitchPhase) -> Option<Duration> {
        match phase {
            SwitchPhase::Validating => self.validating,
            SwitchPhase::Preparing => self.preparing,
            SwitchPhase::Switching => self.switching,
            SwitchPhase::Verifying => self.verifying,
            _ => None,
        }
    }
}

fn as_millis<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&(d.as_secs_f64() * 1000.0)),
        None => serializer.serialize_none(),
    }
}

/// One switch attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchRecord {
    /// Attempt number, unique per orchestrator
    pub id: u64,
    /// Endpoint that was active when the switch started
    pub from_endpoint: Option<EndpointId>,
    /// Endpoint being made active
    pub to_endpoint: EndpointId,
    /// Current phase
    pub phase: SwitchPhase,
    /// Every phase entered, in order
    pub phases: Vec<SwitchPhase>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// `None` until the switch reaches a terminal phase
    pub success: Option<bool>,
    pub error: Option<String>,
    pub durations: PhaseDurations,
}

impl SwitchRecord {
    /// Create a new record in the idle phase
    pub fn new(id: u64, from_endpoint: Option<EndpointId>, to_endpoint: EndpointId) -> Self {
        Self {
            id,
            from_endpoint,
            to_endpoint,
            phase: SwitchPhase::Idle,
            phases: Vec::with_capacity(5),
            started_at: Utc::now(),
            completed_at: None,
            success: None,
            error: None,
            durations: PhaseDurations::default(),
        }
    }

    /// Move to the next phase on the success path
    ///
    /// Returns the phase entered, or `None` if the record is already terminal.
    pub fn advance(&mut self) -> Option<SwitchPhase> {
        let next = self.phase.next()?;
        self.phase = next;
        self.phases.push(next);

        if next == SwitchPhase::Complete {
            self.finish(true);
        }

        Some(next)
    }

    /// Fail the switch from whatever phase it is in
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.phase.is_terminal() {
            return;
        }

        self.phase = SwitchPhase::Failed;
        self.phases.push(SwitchPhase::Failed);
        self.error = Some(error.into());
        self.finish(false);
    }

    /// Check if the switch finished
    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Wall-clock duration, once finished
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at
            .and_then(|done| (done - self.started_at).to_std().ok())
    }

    fn finish(&mut self, success: bool) {
        self.success = Some(success);
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_lifecycle() {
        let mut record = SwitchRecord::new(1, Some(EndpointId::new(8080)), EndpointId::new(9090));

        assert_eq!(record.phase, SwitchPhase::Idle);
        assert!(record.success.is_none());

        while record.advance().is_some() {}

        assert_eq!(
            record.phases,
            vec![
                SwitchPhase::Validating,
                SwitchPhase::Preparing,
                SwitchPhase::Switching,
                SwitchPhase::Verifying,
                SwitchPhase::Complete,
            ]
        );
        assert_eq!(record.success, Some(true));
        assert!(record.completed_at.is_some());
        assert!(record.duration().is_some());
    }

    #[test]
    fn test_fail_is_terminal() {
        let mut record = SwitchRecord::new(1, None, EndpointId::new(9090));
        record.advance();
        record.fail("target unavailable");

        assert_eq!(record.phase, SwitchPhase::Failed);
        assert_eq!(record.phases, vec![SwitchPhase::Validating, SwitchPhase::Failed]);
        assert_eq!(record.success, Some(false));
        assert_eq!(record.error.as_deref(), Some("target unavailable"));

        // Nothing moves a terminal record
        assert!(record.advance().is_none());
        record.fail("again");
        assert_eq!(record.error.as_deref(), Some("target unavailable"));
    }

    #[test]
    fn test_percentages() {
        let percents: Vec<u8> = [
            SwitchPhase::Validating,
            SwitchPhase::Preparing,
            SwitchPhase::Switching,
            SwitchPhase::Verifying,
            SwitchPhase::Complete,
        ]
        .iter()
        .filter_map(|p| p.percent())
        .collect();

        assert_eq!(percents, vec![10, 30, 60, 90, 100]);
        assert!(SwitchPhase::Failed.percent().is_none());
    }

    #[test]
    fn test_cancellable_phases() {
        assert!(SwitchPhase::Validating.is_cancellable());
        assert!(SwitchPhase::Preparing.is_cancellable());
        assert!(!SwitchPhase::Switching.is_cancellable());
        assert!(!SwitchPhase::Verifying.is_cancellable());
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let mut durations = PhaseDurations::default();
        durations.set(SwitchPhase::Verifying, Duration::from_millis(500));

        let json = serde_json::to_value(durations).unwrap();
        assert_eq!(json["verifying"], 500.0);
        assert!(json["validating"].is_null());
    }
}
