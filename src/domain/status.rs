//! Lifecycle status and transition tables
//!
//! Exports and tasks share the same closed set of statuses and the same
//! transition vocabulary. The tables here are the single source of truth for
//! which prior statuses each transition accepts; the state machines in
//! `core::export` and `core::task` only apply them against persisted records.

use crate::domain::errors::TidewaterError;
use crate::domain::result::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of an export or an export task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Created,
    Running,
    Terminated,
    /// Older deployments persisted this state as `paused`
    #[serde(alias = "paused")]
    Stopped,
    Error,
}

impl Status {
    /// Statuses that hold the per-key uniqueness slot
    pub const ACTIVE: [Status; 2] = [Status::Created, Status::Running];

    pub const ALL: [Status; 5] = [
        Status::Created,
        Status::Running,
        Status::Terminated,
        Status::Stopped,
        Status::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Created => "created",
            Status::Running => "running",
            Status::Terminated => "terminated",
            Status::Stopped => "stopped",
            Status::Error => "error",
        }
    }

    /// Created or running
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Created | Status::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(Status::Created),
            "running" => Ok(Status::Running),
            "terminated" => Ok(Status::Terminated),
            "stopped" | "paused" => Ok(Status::Stopped),
            "error" => Ok(Status::Error),
            other => Err(format!(
                "Invalid status '{}'. Must be one of: created, running, terminated, stopped, error",
                other
            )),
        }
    }
}

/// A named move between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Finish,
    Stop,
    Error,
    Retry { force: bool },
    Play,
}

/// Which record kind a transition is evaluated for
///
/// Exports treat a repeated `start` or `finish` as a no-op; tasks reject it so
/// that a terminated task can never be finished twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Export,
    Task,
}

/// Outcome of checking a transition against the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Apply,
    AlreadyApplied,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Finish => "finish",
            Transition::Stop => "stop",
            Transition::Error => "error",
            Transition::Retry { force: false } => "retry",
            Transition::Retry { force: true } => "retry(force)",
            Transition::Play => "play",
        }
    }

    /// Status reached when the transition lands
    pub fn target(&self) -> Status {
        match self {
            Transition::Start => Status::Running,
            Transition::Finish => Status::Terminated,
            Transition::Stop => Status::Stopped,
            Transition::Error => Status::Error,
            Transition::Retry { .. } | Transition::Play => Status::Created,
        }
    }

    /// Prior statuses from which the transition is legal
    pub fn valid_from(&self) -> &'static [Status] {
        match self {
            Transition::Start => &[Status::Created],
            Transition::Finish => &[Status::Running],
            Transition::Stop | Transition::Error => &[Status::Created, Status::Running],
            Transition::Retry { force: false } => &[Status::Error],
            Transition::Retry { force: true } => &[Status::Error, Status::Stopped],
            Transition::Play => &[Status::Stopped],
        }
    }

    /// Checks the transition against `current`
    ///
    /// # Errors
    ///
    /// Returns `TidewaterError::InvalidStateChange` when `current` is not a
    /// legal predecessor and the transition is not an idempotent repeat.
    pub fn evaluate(&self, current: Status, lifecycle: Lifecycle) -> Result<Verdict> {
        if self.valid_from().contains(&current) {
            return Ok(Verdict::Apply);
        }

        let repeat = match (lifecycle, self) {
            (Lifecycle::Export, Transition::Start) => current == Status::Running,
            (Lifecycle::Export, Transition::Finish) => current == Status::Terminated,
            _ => false,
        };
        if repeat {
            return Ok(Verdict::AlreadyApplied);
        }

        Err(self.rejection(current))
    }

    /// Builds the error raised when the transition is refused from `current`
    pub fn rejection(&self, current: Status) -> TidewaterError {
        TidewaterError::InvalidStateChange {
            old: current,
            new: self.target(),
            valid_from: self.valid_from().to_vec(),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Transition::Start, Status::Created ; "start from created")]
    #[test_case(Transition::Finish, Status::Running ; "finish from running")]
    #[test_case(Transition::Stop, Status::Created ; "stop from created")]
    #[test_case(Transition::Stop, Status::Running ; "stop from running")]
    #[test_case(Transition::Error, Status::Running ; "error from running")]
    #[test_case(Transition::Retry { force: false }, Status::Error ; "retry from error")]
    #[test_case(Transition::Retry { force: true }, Status::Stopped ; "forced retry from stopped")]
    #[test_case(Transition::Play, Status::Stopped ; "play from stopped")]
    fn test_legal_transitions(transition: Transition, from: Status) {
        assert_eq!(
            transition.evaluate(from, Lifecycle::Task).unwrap(),
            Verdict::Apply
        );
    }

    #[test_case(Transition::Start, Status::Terminated ; "start from terminated")]
    #[test_case(Transition::Finish, Status::Created ; "finish from created")]
    #[test_case(Transition::Finish, Status::Terminated ; "task finish twice")]
    #[test_case(Transition::Stop, Status::Error ; "stop from error")]
    #[test_case(Transition::Retry { force: false }, Status::Stopped ; "retry from stopped")]
    #[test_case(Transition::Play, Status::Running ; "play from running")]
    fn test_illegal_task_transitions(transition: Transition, from: Status) {
        let err = transition.evaluate(from, Lifecycle::Task).unwrap_err();
        assert!(matches!(err, TidewaterError::InvalidStateChange { .. }));
    }

    #[test]
    fn test_export_repeats_are_noops() {
        assert_eq!(
            Transition::Start
                .evaluate(Status::Running, Lifecycle::Export)
                .unwrap(),
            Verdict::AlreadyApplied
        );
        assert_eq!(
            Transition::Finish
                .evaluate(Status::Terminated, Lifecycle::Export)
                .unwrap(),
            Verdict::AlreadyApplied
        );
    }

    #[test]
    fn test_retry_rejection_lists_valid_from() {
        let err = Transition::Retry { force: false }
            .evaluate(Status::Stopped, Lifecycle::Export)
            .unwrap_err();
        match err {
            TidewaterError::InvalidStateChange {
                old,
                new,
                valid_from,
            } => {
                assert_eq!(old, Status::Stopped);
                assert_eq!(new, Status::Created);
                assert_eq!(valid_from, vec![Status::Error]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&Status::Terminated).unwrap(),
            "\"terminated\""
        );
        let legacy: Status = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(legacy, Status::Stopped);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Running".parse::<Status>().unwrap(), Status::Running);
        assert!("done".parse::<Status>().is_err());
    }
}
