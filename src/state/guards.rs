//! Validation run before a lifecycle transition is allowed to write.
//!
//! A guard inspects the snapshot being finalized and, when it passes, decides
//! what the authoritative write carries: the fields to commit and the
//! assignments to store next to them.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    dao::models::{FinalWrite, LifecycleState, RecordKind},
    state::lifecycle::LifecycleEvent,
};

/// Sections a match report summary must fill before finalizing.
pub const SUMMARY_SECTIONS: [&str; 4] = [
    "defenseSummary",
    "midfieldSummary",
    "attackSummary",
    "generalSummary",
];

/// Reasons a snapshot is refused by a guard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// A field the transition needs is absent or empty.
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("field `{field}` is malformed: {reason}")]
    MalformedField { field: String, reason: String },
    /// Formation is not a dash-separated list of positive line sizes.
    #[error("invalid formation `{0}`")]
    InvalidFormation(String),
    #[error("formation needs {expected} positions but the lineup has {actual}")]
    PositionCount { expected: usize, actual: usize },
    #[error("positions without a player: {}", .0.join(", "))]
    UnassignedPositions(Vec<String>),
    /// Same player in two lineup slots.
    #[error("player `{0}` is assigned to more than one position")]
    DuplicatePlayer(String),
}

/// Outcome of a successful guard check.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    /// Fields replacing the committed ones; `None` keeps them.
    pub committed_fields: Option<Value>,
    /// Assignments stored with the transition.
    pub assignments: Option<Value>,
    /// Whether the draft is cleared with the write.
    pub clear_draft: bool,
}

impl Commit {
    /// Commit the full snapshot and clear the draft.
    fn snapshot(snapshot: &Value, assignments: Option<Value>) -> Self {
        Self {
            committed_fields: Some(snapshot.clone()),
            assignments,
            clear_draft: true,
        }
    }

    /// Change the state flag only.
    fn state_only() -> Self {
        Self {
            committed_fields: None,
            assignments: None,
            clear_draft: false,
        }
    }

    pub fn into_final_write(self, from: LifecycleState, to: LifecycleState) -> FinalWrite {
        FinalWrite {
            from,
            to,
            committed_fields: self.committed_fields,
            assignments: self.assignments,
            clear_draft: self.clear_draft,
        }
    }
}

/// Validation and write shaping for the transitions of one record kind.
pub trait TransitionGuard: Send + Sync {
    fn check(&self, event: LifecycleEvent, snapshot: &Value) -> Result<Commit, GuardError>;
}

/// Guard for match lineups and reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchGuard;

/// Guard for training plans.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrainingPlanGuard;

/// Built-in guard for a record kind.
pub fn guard_for(kind: RecordKind) -> Arc<dyn TransitionGuard> {
    match kind {
        RecordKind::Match => Arc::new(MatchGuard),
        RecordKind::TrainingPlan => Arc::new(TrainingPlanGuard),
    }
}

impl TransitionGuard for MatchGuard {
    fn check(&self, event: LifecycleEvent, snapshot: &Value) -> Result<Commit, GuardError> {
        let fields = fields(snapshot)?;
        match event {
            LifecycleEvent::BeginMatch => {
                let formation = required_str(fields, "formation")?;
                let lineup = fields
                    .get("lineup")
                    .ok_or_else(|| GuardError::MissingField("lineup".into()))?;
                validate_lineup(formation, lineup)?;

                let assignments = Value::Object(Map::from_iter([
                    ("formation".to_owned(), Value::String(formation.to_owned())),
                    ("lineup".to_owned(), lineup.clone()),
                ]));
                Ok(Commit::snapshot(snapshot, Some(assignments)))
            }
            LifecycleEvent::Finalize => {
                let summary = fields
                    .get("teamSummary")
                    .and_then(Value::as_object)
                    .ok_or_else(|| GuardError::MissingField("teamSummary".into()))?;
                for section in SUMMARY_SECTIONS {
                    if !is_filled(summary.get(section)) {
                        return Err(GuardError::MissingField(format!("teamSummary.{section}")));
                    }
                }

                let stats = fields
                    .get("playerStats")
                    .filter(|stats| !stats.is_null())
                    .ok_or_else(|| GuardError::MissingField("playerStats".into()))?;

                let assignments = Value::Object(Map::from_iter([(
                    "playerStats".to_owned(),
                    stats.clone(),
                )]));
                Ok(Commit::snapshot(snapshot, Some(assignments)))
            }
            LifecycleEvent::Postpone => Ok(Commit::state_only()),
        }
    }
}

impl TransitionGuard for TrainingPlanGuard {
    fn check(&self, event: LifecycleEvent, snapshot: &Value) -> Result<Commit, GuardError> {
        let fields = fields(snapshot)?;
        match event {
            LifecycleEvent::BeginMatch => {
                let drills = fields
                    .get("drills")
                    .ok_or_else(|| GuardError::MissingField("drills".into()))?;
                let selected = drills.as_array().ok_or_else(|| GuardError::MalformedField {
                    field: "drills".into(),
                    reason: "expected a list".into(),
                })?;
                if selected.is_empty() {
                    return Err(GuardError::MissingField("drills".into()));
                }

                let assignments =
                    Value::Object(Map::from_iter([("drills".to_owned(), drills.clone())]));
                Ok(Commit::snapshot(snapshot, Some(assignments)))
            }
            LifecycleEvent::Finalize => {
                if !is_filled(fields.get("notes")) {
                    return Err(GuardError::MissingField("notes".into()));
                }
                Ok(Commit::snapshot(snapshot, None))
            }
            LifecycleEvent::Postpone => Ok(Commit::state_only()),
        }
    }
}

fn fields(snapshot: &Value) -> Result<&Map<String, Value>, GuardError> {
    snapshot.as_object().ok_or_else(|| GuardError::MalformedField {
        field: "snapshot".into(),
        reason: "expected an object".into(),
    })
}

fn required_str<'a>(fields: &'a Map<String, Value>, field: &str) -> Result<&'a str, GuardError> {
    fields
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| GuardError::MissingField(field.to_owned()))
}

fn is_filled(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|text| !text.trim().is_empty())
}

/// Number of positions a formation such as `2-3-1` needs, keeper included.
pub fn positions_for(formation: &str) -> Result<usize, GuardError> {
    let invalid = || GuardError::InvalidFormation(formation.to_owned());

    let outfield = formation
        .split('-')
        .map(|line| match line.trim().parse::<usize>() {
            Ok(players) if players > 0 => Ok(players),
            _ => Err(invalid()),
        })
        .sum::<Result<usize, GuardError>>()?;

    Ok(outfield + 1)
}

fn validate_lineup(formation: &str, lineup: &Value) -> Result<(), GuardError> {
    let expected = positions_for(formation)?;
    let lineup: IndexMap<String, Option<String>> = serde_json::from_value(lineup.clone())
        .map_err(|err| GuardError::MalformedField {
            field: "lineup".into(),
            reason: err.to_string(),
        })?;

    if lineup.len() != expected {
        return Err(GuardError::PositionCount {
            expected,
            actual: lineup.len(),
        });
    }

    let unassigned: Vec<String> = lineup
        .iter()
        .filter(|(_, player)| player.as_deref().is_none_or(|id| id.trim().is_empty()))
        .map(|(position, _)| position.clone())
        .collect();
    if !unassigned.is_empty() {
        return Err(GuardError::UnassignedPositions(unassigned));
    }

    let mut seen = std::collections::HashSet::new();
    for player in lineup.values().flatten() {
        if !seen.insert(player.as_str()) {
            return Err(GuardError::DuplicatePlayer(player.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn lineup_snapshot(lineup: Value) -> Value {
        json!({"formation": "2-3-1", "lineup": lineup, "notes": "bring bibs"})
    }

    fn full_lineup() -> Value {
        json!({
            "gk": "p1", "lb": "p2", "rb": "p3",
            "lm": "p4", "cm": "p5", "rm": "p6", "st": "p7"
        })
    }

    #[test]
    fn formation_counts_outfield_lines_plus_keeper() {
        assert_eq!(positions_for("2-3-1").unwrap(), 7);
        assert_eq!(positions_for("3-3-2").unwrap(), 9);
        assert_eq!(positions_for("4-4-2").unwrap(), 11);
        assert!(positions_for("").is_err());
        assert!(positions_for("2-x-1").is_err());
        assert!(positions_for("2-0-1").is_err());
    }

    #[test]
    fn complete_lineup_commits_snapshot_and_assignments() {
        let snapshot = lineup_snapshot(full_lineup());
        let commit = MatchGuard
            .check(LifecycleEvent::BeginMatch, &snapshot)
            .unwrap();

        assert_eq!(commit.committed_fields, Some(snapshot));
        assert_eq!(
            commit.assignments,
            Some(json!({"formation": "2-3-1", "lineup": full_lineup()}))
        );
        assert!(commit.clear_draft);
    }

    #[test]
    fn lineup_with_open_position_is_rejected() {
        let mut lineup = full_lineup();
        lineup["st"] = Value::Null;
        lineup["cm"] = json!("");

        let err = MatchGuard
            .check(LifecycleEvent::BeginMatch, &lineup_snapshot(lineup))
            .unwrap_err();

        assert_eq!(
            err,
            GuardError::UnassignedPositions(vec!["cm".into(), "st".into()])
        );
    }

    #[test]
    fn player_cannot_hold_two_positions() {
        let mut lineup = full_lineup();
        lineup["st"] = json!("p1");

        let err = MatchGuard
            .check(LifecycleEvent::BeginMatch, &lineup_snapshot(lineup))
            .unwrap_err();

        assert_eq!(err, GuardError::DuplicatePlayer("p1".into()));
    }

    #[test]
    fn lineup_size_must_match_formation() {
        let err = MatchGuard
            .check(
                LifecycleEvent::BeginMatch,
                &lineup_snapshot(json!({"gk": "p1", "st": "p2"})),
            )
            .unwrap_err();

        assert_eq!(
            err,
            GuardError::PositionCount {
                expected: 7,
                actual: 2
            }
        );
    }

    #[test]
    fn report_requires_every_summary_section_and_stats() {
        let mut report = json!({
            "teamSummary": {
                "defenseSummary": "Compact",
                "midfieldSummary": "Busy",
                "attackSummary": "Sharp",
                "generalSummary": "Good game"
            },
            "playerStats": {"p1": {"goals": 1}}
        });
        let commit = MatchGuard
            .check(LifecycleEvent::Finalize, &report)
            .unwrap();
        assert_eq!(
            commit.assignments,
            Some(json!({"playerStats": {"p1": {"goals": 1}}}))
        );

        report["teamSummary"]["attackSummary"] = json!("   ");
        assert_eq!(
            MatchGuard
                .check(LifecycleEvent::Finalize, &report)
                .unwrap_err(),
            GuardError::MissingField("teamSummary.attackSummary".into())
        );

        report["teamSummary"]["attackSummary"] = json!("Sharp");
        report["playerStats"] = Value::Null;
        assert_eq!(
            MatchGuard
                .check(LifecycleEvent::Finalize, &report)
                .unwrap_err(),
            GuardError::MissingField("playerStats".into())
        );
    }

    #[test]
    fn postpone_only_changes_state() {
        for guard in [guard_for(RecordKind::Match), guard_for(RecordKind::TrainingPlan)] {
            let commit = guard.check(LifecycleEvent::Postpone, &json!({})).unwrap();
            assert_eq!(commit.committed_fields, None);
            assert_eq!(commit.assignments, None);
            assert!(!commit.clear_draft);
        }
    }

    #[test]
    fn training_plan_needs_a_drill_then_notes() {
        let guard = TrainingPlanGuard;
        assert_eq!(
            guard
                .check(LifecycleEvent::BeginMatch, &json!({"drills": []}))
                .unwrap_err(),
            GuardError::MissingField("drills".into())
        );
        assert!(
            guard
                .check(LifecycleEvent::BeginMatch, &json!({"drills": ["rondo"]}))
                .is_ok()
        );
        assert_eq!(
            guard
                .check(LifecycleEvent::Finalize, &json!({"notes": ""}))
                .unwrap_err(),
            GuardError::MissingField("notes".into())
        );
        assert!(
            guard
                .check(LifecycleEvent::Finalize, &json!({"notes": "Pressing worked"}))
                .is_ok()
        );
    }
}
