use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Ordered lifecycle stage of an editable record.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// The match (or training session) is planned; the lineup is being prepared.
    Scheduled,
    /// Kick-off happened; the report is being written.
    Played,
    /// The report was finalized; nothing is editable anymore.
    Done,
}

impl LifecycleState {
    /// Serialized name of the state, as stored in documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Scheduled => "scheduled",
            LifecycleState::Played => "played",
            LifecycleState::Done => "done",
        }
    }
}

/// Kind of editable record, which decides where drafting is permitted and
/// which guard validates its transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Lineup and match report of a single match.
    Match,
    /// Drill selection and session notes of a training plan.
    TrainingPlan,
}

impl RecordKind {
    /// Lifecycle states in which in-progress edits may be autosaved as a draft.
    pub fn drafting_states(&self) -> &'static [LifecycleState] {
        match self {
            RecordKind::Match | RecordKind::TrainingPlan => {
                &[LifecycleState::Scheduled, LifecycleState::Played]
            }
        }
    }

    /// Whether drafting is permitted while the record is in `state`.
    pub fn allows_drafting(&self, state: LifecycleState) -> bool {
        self.drafting_states().contains(&state)
    }

    /// Stable key used in configuration files and document identifiers.
    pub fn as_key(&self) -> &'static str {
        match self {
            RecordKind::Match => "match",
            RecordKind::TrainingPlan => "training_plan",
        }
    }
}

/// Editable record persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordEntity {
    /// Stable identifier of the record (shared with its parent match or plan).
    pub id: Uuid,
    /// Kind of record.
    pub kind: RecordKind,
    /// Current lifecycle state.
    pub lifecycle_state: LifecycleState,
    /// Last authoritative field values, overwritten only by a final write.
    pub committed_fields: Value,
    /// Possibly partial in-progress edits owned by the autosave loop.
    pub draft: Option<Value>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the record was updated (draft or final write).
    pub updated_at: SystemTime,
}

impl RecordEntity {
    /// Build a fresh record in the `Scheduled` state with no draft.
    pub fn new(kind: RecordKind, committed_fields: Value) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            lifecycle_state: LifecycleState::Scheduled,
            committed_fields,
            draft: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-record roster / assignment entries kept apart from the draft blob
/// (lineup positions after kick-off, per-player statistics after the report).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentsEntity {
    /// Identifier of the owning record.
    pub record_id: Uuid,
    /// Assignment fields, shaped like the record's editable fields.
    pub entries: Value,
    /// Last time the assignments were written.
    pub updated_at: SystemTime,
}

/// Authoritative write performed by a lifecycle transition.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalWrite {
    /// State the record must still be in for the write to apply.
    pub from: LifecycleState,
    /// State the record moves to.
    pub to: LifecycleState,
    /// New committed fields; `None` leaves the stored ones untouched.
    pub committed_fields: Option<Value>,
    /// Assignments to store in the same outcome, if the transition produces any.
    pub assignments: Option<Value>,
    /// Whether the draft is cleared as part of the write.
    pub clear_draft: bool,
}
