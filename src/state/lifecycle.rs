use std::time::Instant;

use serde::Deserialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::LifecycleState;

/// Events that move a record through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Kick-off: the lineup is committed and the report becomes editable.
    BeginMatch,
    /// The report is complete; the record becomes read-only.
    Finalize,
    /// The match did not happen after all; return to planning.
    Postpone,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The state the record was in when the event was received.
    pub from: LifecycleState,
    /// The event that cannot be applied from this state.
    pub event: LifecycleEvent,
}

/// Errors that can occur when planning a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current state.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Lifecycle state changed since the plan was created.
    StateMismatch {
        /// State when the plan was created.
        expected: LifecycleState,
        /// Current state.
        actual: LifecycleState,
    },
    /// Version changed since the plan was created.
    VersionMismatch {
        /// Version expected after the transition.
        expected: usize,
        /// Version the transition would actually produce.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated transition that has not been applied yet. While a plan is
/// pending the record is *finalizing* and drafting is closed.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// State the record is currently in.
    pub from: LifecycleState,
    /// State the record will move to.
    pub to: LifecycleState,
    /// Event that triggered this transition.
    pub event: LifecycleEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Point-in-time view of a record lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Number of transitions applied since the machine was loaded.
    pub version: usize,
    /// Target state of the pending transition, if any.
    pub pending: Option<LifecycleState>,
}

/// Lifecycle state machine of a single record.
#[derive(Debug, Clone)]
pub struct RecordLifecycle {
    state: LifecycleState,
    version: usize,
    pending: Option<Plan>,
}

impl RecordLifecycle {
    /// Load the machine in the state read from storage.
    pub fn new(state: LifecycleState) -> Self {
        Self {
            state,
            version: 0,
            pending: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Whether a transition is planned but not yet applied or aborted.
    pub fn is_finalizing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Validate that `event` applies to the current state and reserve the transition.
    pub fn plan(&mut self, event: LifecycleEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.state,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, returning the new state.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<LifecycleState, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.state != plan.from {
            return Err(ApplyError::StateMismatch {
                expected: plan.from,
                actual: self.state,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.state = plan.to;
        self.version = plan.version_next;

        Ok(self.state)
    }

    /// Drop a planned transition, leaving the state untouched.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Adopt a state observed in storage that moved on without this machine.
    /// Ignored while a transition is pending.
    pub fn resync(&mut self, state: LifecycleState) -> bool {
        if self.pending.is_some() || self.state == state {
            return false;
        }
        self.state = state;
        self.version += 1;
        true
    }

    fn compute_transition(&self, event: LifecycleEvent) -> Result<LifecycleState, InvalidTransition> {
        let next = match (self.state, event) {
            (LifecycleState::Scheduled, LifecycleEvent::BeginMatch) => LifecycleState::Played,
            (LifecycleState::Played, LifecycleEvent::Finalize) => LifecycleState::Done,
            (LifecycleState::Played, LifecycleEvent::Postpone) => LifecycleState::Scheduled,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
