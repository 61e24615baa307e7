//! One-shot rewrite of legacy task status codes in stored report snapshots.

use serde_json::Value;
use thiserror::Error;

/// Stored marker value once legacy codes have been rewritten.
pub const STATUS_SCHEMA_VERSION: i32 = 2;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("competencies snapshot is not a list (found {0})")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub ran: bool,
    pub statuses_rewritten: usize,
    pub version: i32,
}

pub fn migrate_status_code(raw: &str) -> Option<&'static str> {
    match raw {
        "NOK" => Some("NEEDS_IMPROVEMENT"),
        "NA" => Some("NOT_ASSESSED"),
        _ => None,
    }
}

/// Rewrites every legacy `status` in a serialized competency tree.
/// Returns how many values changed.
pub fn migrate_competencies(value: &mut Value) -> Result<usize, MigrationError> {
    let categories = match value {
        Value::Array(categories) => categories,
        Value::Null => return Ok(0),
        other => return Err(MigrationError::Malformed(json_kind(other))),
    };

    let mut changed = 0;
    for category in categories.iter_mut() {
        let Some(items) = category.get_mut("items").and_then(Value::as_array_mut) else {
            continue;
        };
        for item in items.iter_mut() {
            let Some(status) = item.get_mut("status") else {
                continue;
            };
            if let Some(next) = status.as_str().and_then(migrate_status_code) {
                *status = Value::String(next.to_string());
                changed += 1;
            }
        }
    }
    Ok(changed)
}

/// Runs the migration over all snapshots unless `stored_version` says it
/// already ran. The caller persists `report.version`.
pub fn run<'a>(
    stored_version: i32,
    snapshots: impl IntoIterator<Item = &'a mut Value>,
) -> Result<MigrationReport, MigrationError> {
    if stored_version >= STATUS_SCHEMA_VERSION {
        return Ok(MigrationReport {
            ran: false,
            statuses_rewritten: 0,
            version: stored_version,
        });
    }

    let mut statuses_rewritten = 0;
    for snapshot in snapshots {
        statuses_rewritten += migrate_competencies(snapshot)?;
    }
    Ok(MigrationReport {
        ran: true,
        statuses_rewritten,
        version: STATUS_SCHEMA_VERSION,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(statuses: &[&str]) -> Value {
        json!([{
            "category": "DNS",
            "items": statuses
                .iter()
                .map(|s| json!({ "task": "t", "status": s, "comment": "" }))
                .collect::<Vec<_>>()
        }])
    }

    fn statuses(value: &Value) -> Vec<String> {
        value[0]["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["status"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_legacy_codes_rewritten() {
        let mut value = snapshot(&["NOK", "NA", "OK", ""]);
        assert_eq!(migrate_competencies(&mut value).unwrap(), 2);
        assert_eq!(
            statuses(&value),
            vec!["NEEDS_IMPROVEMENT", "NOT_ASSESSED", "OK", ""]
        );
    }

    #[test]
    fn test_migrated_data_is_untouched() {
        let mut value = snapshot(&["OK", "NEEDS_IMPROVEMENT", "NOT_ASSESSED"]);
        let before = value.clone();
        assert_eq!(migrate_competencies(&mut value).unwrap(), 0);
        assert_eq!(value, before);
    }

    #[test]
    fn test_applying_twice_equals_once() {
        let mut once = snapshot(&["NOK", "NA"]);
        migrate_competencies(&mut once).unwrap();
        let mut twice = once.clone();
        migrate_competencies(&mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_gate_runs_once() {
        let mut values = vec![snapshot(&["NOK"]), snapshot(&["NA", "NA"])];
        let report = run(1, values.iter_mut()).unwrap();
        assert!(report.ran);
        assert_eq!(report.statuses_rewritten, 3);
        assert_eq!(report.version, STATUS_SCHEMA_VERSION);

        let mut legacy = vec![snapshot(&["NOK"])];
        let skipped = run(report.version, legacy.iter_mut()).unwrap();
        assert!(!skipped.ran);
        assert_eq!(statuses(&legacy[0]), vec!["NOK"]);
    }

    #[test]
    fn test_malformed_snapshot_is_an_error() {
        let mut values = vec![json!({ "category": "oops" })];
        assert!(run(0, values.iter_mut()).is_err());
    }
}
