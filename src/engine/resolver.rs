//! Picks the initial editing snapshot of a record when an editor mounts.
//!
//! Sources are ranked: the stored draft, the fallback cache entry, the
//! assignment collection, the committed fields and finally the static
//! defaults. Drafts and cache entries only count while the record's lifecycle
//! state permits drafting. Whatever source wins is layered over the lower
//! ones with [`merge_fields`], so a partial draft never hides committed
//! sibling fields.
//!
//! Merging works one level deep: top-level fields are replaced, and when both
//! sides hold an object for the same field (a *group*, such as
//! `teamSummary`) the overlay's keys are applied onto the base group. Values
//! nested below a group are replaced wholesale.

use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::dao::models::{LifecycleState, RecordKind};

/// Candidate sources for a record's initial snapshot.
#[derive(Debug, Clone, Copy)]
pub struct DraftSources<'a> {
    /// Draft blob stored alongside the record.
    pub draft: Option<&'a Value>,
    /// Entry of the fallback cache for the editing context.
    pub cached: Option<&'a Value>,
    /// Roster / assignment collection of the record.
    pub assignments: Option<&'a Value>,
    /// Last committed fields.
    pub committed: Option<&'a Value>,
    /// Static defaults for the record kind.
    pub defaults: &'a Value,
}

/// Which source decided the initial snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedFrom {
    Draft,
    Cache,
    Assignments,
    Committed,
    Defaults,
}

/// Initial snapshot together with the source it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub snapshot: Value,
    pub source: ResolvedFrom,
}

/// Resolve the snapshot an editor starts from.
///
/// Every source is layered over `defaults` merged with `committed`, so fields
/// missing from the committed values still appear with their default. With a
/// null or empty draft the snapshot therefore equals the committed fields
/// only when the defaults add no keys of their own.
///
/// Evaluated once per mount; later edits flow through the persister only.
pub fn resolve_initial(
    kind: RecordKind,
    state: LifecycleState,
    sources: DraftSources<'_>,
) -> Resolution {
    let base = || match sources.committed {
        Some(committed) => merge_fields(sources.defaults, committed),
        None => merge_fields(sources.defaults, &Value::Null),
    };

    if kind.allows_drafting(state) {
        if let Some(draft) = sources.draft.filter(|value| fields_of(value).is_some()) {
            return Resolution {
                snapshot: merge_fields(&base(), draft),
                source: ResolvedFrom::Draft,
            };
        }
        if let Some(cached) = sources.cached.filter(|value| fields_of(value).is_some()) {
            return Resolution {
                snapshot: merge_fields(&base(), cached),
                source: ResolvedFrom::Cache,
            };
        }
    }

    if let Some(assignments) = sources.assignments.filter(|value| fields_of(value).is_some()) {
        return Resolution {
            snapshot: merge_fields(&base(), assignments),
            source: ResolvedFrom::Assignments,
        };
    }

    if sources.committed.and_then(fields_of).is_some() {
        return Resolution {
            snapshot: base(),
            source: ResolvedFrom::Committed,
        };
    }

    Resolution {
        snapshot: merge_fields(sources.defaults, &Value::Null),
        source: ResolvedFrom::Defaults,
    }
}

/// Layer `overlay` over `base`, one group level deep.
///
/// A null, empty or non-object overlay leaves `base` unchanged; a non-object
/// base is treated as empty. The result is always an object.
pub fn merge_fields(base: &Value, overlay: &Value) -> Value {
    let mut merged = match base {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };

    let Some(overlay) = fields_of(overlay) else {
        return Value::Object(merged);
    };

    for (key, value) in overlay {
        match (merged.get_mut(key), value) {
            (Some(Value::Object(group)), Value::Object(overrides)) => {
                for (field, field_value) in overrides {
                    group.insert(field.clone(), field_value.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(merged)
}

/// Fields of a usable structured value; null, empty and non-object values have none.
fn fields_of(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(fields) if !fields.is_empty() => Some(fields),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sources<'a>(
        draft: Option<&'a Value>,
        committed: Option<&'a Value>,
        defaults: &'a Value,
    ) -> DraftSources<'a> {
        DraftSources {
            draft,
            cached: None,
            assignments: None,
            committed,
            defaults,
        }
    }

    #[test]
    fn draft_overrides_committed_field() {
        let draft = json!({"teamSummary": {"defenseSummary": "Draft"}});
        let committed = json!({"teamSummary": {"defenseSummary": "Saved"}});
        let defaults = json!({});

        let resolution = resolve_initial(
            RecordKind::Match,
            LifecycleState::Played,
            sources(Some(&draft), Some(&committed), &defaults),
        );

        assert_eq!(resolution.source, ResolvedFrom::Draft);
        assert_eq!(
            resolution.snapshot["teamSummary"]["defenseSummary"],
            json!("Draft")
        );
    }

    #[test]
    fn partial_draft_preserves_sibling_group_keys() {
        let draft = json!({"teamSummary": {"defenseSummary": "Draft"}});
        let committed = json!({
            "teamSummary": {
                "defenseSummary": "Saved-D",
                "midfieldSummary": "Saved-M",
                "attackSummary": "Saved-A"
            }
        });
        let defaults = json!({});

        let resolution = resolve_initial(
            RecordKind::Match,
            LifecycleState::Played,
            sources(Some(&draft), Some(&committed), &defaults),
        );

        let summary = &resolution.snapshot["teamSummary"];
        assert_eq!(summary["defenseSummary"], json!("Draft"));
        assert_eq!(summary["midfieldSummary"], json!("Saved-M"));
        assert_eq!(summary["attackSummary"], json!("Saved-A"));
    }

    #[test]
    fn null_or_empty_draft_keeps_committed_values() {
        let committed = json!({"formation": "2-3-1", "teamSummary": {"defenseSummary": "Saved"}});
        let defaults = json!({});

        for draft in [json!(null), json!({})] {
            let resolution = resolve_initial(
                RecordKind::Match,
                LifecycleState::Scheduled,
                sources(Some(&draft), Some(&committed), &defaults),
            );
            assert_eq!(resolution.source, ResolvedFrom::Committed);
            assert_eq!(resolution.snapshot, committed);
        }
    }

    #[test]
    fn empty_draft_still_shows_defaults_missing_from_committed() {
        let committed = json!({"formation": "3-2-1", "teamSummary": {"defenseSummary": "Saved"}});
        let defaults = json!({
            "formation": "2-3-1",
            "teamSummary": {"defenseSummary": "", "attackSummary": ""},
            "notes": ""
        });

        let resolution = resolve_initial(
            RecordKind::Match,
            LifecycleState::Played,
            sources(Some(&json!({})), Some(&committed), &defaults),
        );

        assert_eq!(resolution.source, ResolvedFrom::Committed);
        assert_eq!(
            resolution.snapshot,
            json!({
                "formation": "3-2-1",
                "teamSummary": {"defenseSummary": "Saved", "attackSummary": ""},
                "notes": ""
            })
        );
    }

    #[test]
    fn malformed_draft_is_ignored() {
        let committed = json!({"formation": "2-3-1"});
        let defaults = json!({});

        for draft in [json!("garbage"), json!([1, 2]), json!(42)] {
            let resolution = resolve_initial(
                RecordKind::Match,
                LifecycleState::Scheduled,
                sources(Some(&draft), Some(&committed), &defaults),
            );
            assert_eq!(resolution.source, ResolvedFrom::Committed);
            assert_eq!(resolution.snapshot, committed);
        }
    }

    #[test]
    fn values_below_group_level_are_replaced_wholesale() {
        let base = json!({"playerReports": {"p1": {"goals": 2, "assists": 1}}});
        let overlay = json!({"playerReports": {"p1": {"goals": 3}}});

        let merged = merge_fields(&base, &overlay);

        assert_eq!(merged, json!({"playerReports": {"p1": {"goals": 3}}}));
    }

    #[test]
    fn defaults_fill_fields_missing_everywhere_else() {
        let draft = json!({"formation": "3-2-1"});
        let committed = json!({"teamSummary": {"defenseSummary": "Saved"}});
        let defaults = json!({"formation": "2-3-1", "notes": "", "teamSummary": {}});

        let resolution = resolve_initial(
            RecordKind::Match,
            LifecycleState::Scheduled,
            sources(Some(&draft), Some(&committed), &defaults),
        );

        assert_eq!(
            resolution.snapshot,
            json!({
                "formation": "3-2-1",
                "notes": "",
                "teamSummary": {"defenseSummary": "Saved"}
            })
        );
    }

    #[test]
    fn draft_is_ignored_once_drafting_is_closed() {
        let draft = json!({"formation": "3-2-1"});
        let assignments = json!({"lineup": {"gk": "p1"}});
        let committed = json!({"formation": "2-3-1"});
        let defaults = json!({});

        let resolution = resolve_initial(
            RecordKind::Match,
            LifecycleState::Done,
            DraftSources {
                draft: Some(&draft),
                cached: None,
                assignments: Some(&assignments),
                committed: Some(&committed),
                defaults: &defaults,
            },
        );

        assert_eq!(resolution.source, ResolvedFrom::Assignments);
        assert_eq!(
            resolution.snapshot,
            json!({"formation": "2-3-1", "lineup": {"gk": "p1"}})
        );
    }

    #[test]
    fn cache_entry_is_used_when_no_draft_was_stored() {
        let cached = json!({"drills": ["rondo"]});
        let committed = json!({"drills": [], "notes": "warm-up"});
        let defaults = json!({});

        let resolution = resolve_initial(
            RecordKind::TrainingPlan,
            LifecycleState::Scheduled,
            DraftSources {
                draft: None,
                cached: Some(&cached),
                assignments: None,
                committed: Some(&committed),
                defaults: &defaults,
            },
        );

        assert_eq!(resolution.source, ResolvedFrom::Cache);
        assert_eq!(
            resolution.snapshot,
            json!({"drills": ["rondo"], "notes": "warm-up"})
        );
    }

    #[test]
    fn stored_draft_outranks_cache_entry() {
        let draft = json!({"notes": "from draft"});
        let cached = json!({"notes": "from cache"});
        let defaults = json!({});

        let resolution = resolve_initial(
            RecordKind::TrainingPlan,
            LifecycleState::Scheduled,
            DraftSources {
                draft: Some(&draft),
                cached: Some(&cached),
                assignments: None,
                committed: None,
                defaults: &defaults,
            },
        );

        assert_eq!(resolution.source, ResolvedFrom::Draft);
        assert_eq!(resolution.snapshot, json!({"notes": "from draft"}));
    }

    #[test]
    fn defaults_are_used_when_nothing_else_exists() {
        let committed = json!({});
        let defaults = json!({"formation": "2-3-1", "lineup": {}});

        let resolution = resolve_initial(
            RecordKind::Match,
            LifecycleState::Scheduled,
            sources(None, Some(&committed), &defaults),
        );

        assert_eq!(resolution.source, ResolvedFrom::Defaults);
        assert_eq!(resolution.snapshot, defaults);
    }
}
