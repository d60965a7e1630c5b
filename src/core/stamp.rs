//! Change stamps and collection filtering
//!
//! A document's effective change stamp is the first non-null value among an
//! ordered list of candidate fields, falling back to `_id`. The list is, in
//! order: the profile's update field, the default update fields, the profile's
//! insert field, the default insert fields. The value is coerced to a date the
//! way MongoDB's `$convert` does; anything that does not convert yields no
//! stamp and the document is never extracted.

use crate::config::StampDefaults;
use crate::domain::profile::SourceProfile;
use crate::domain::task::Window;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

/// Builds [`StampPlan`]s from the configured defaults and profile overrides
#[derive(Debug, Clone)]
pub struct StampResolver {
    defaults: StampDefaults,
}

impl StampResolver {
    pub fn new(defaults: StampDefaults) -> Self {
        Self { defaults }
    }

    pub fn plan(&self, source: &SourceProfile, collection: &str) -> StampPlan {
        let overrides = source.stamps.for_collection(collection);
        let fields = overrides
            .update_field
            .into_iter()
            .chain(self.defaults.update_fields.iter().cloned())
            .chain(overrides.insert_field)
            .chain(self.defaults.insert_fields.iter().cloned());
        StampPlan::new(fields)
    }
}

/// Ordered candidate fields of one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampPlan {
    fields: Vec<String>,
}

impl StampPlan {
    /// Keeps the first occurrence of each field
    pub fn new(fields: impl IntoIterator<Item = String>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for field in fields {
            let field = field.trim().to_string();
            if !field.is_empty() && !unique.contains(&field) {
                unique.push(field);
            }
        }
        Self { fields: unique }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Effective change stamp of `doc`
    pub fn effective_stamp(&self, doc: &Value) -> Option<DateTime<Utc>> {
        let chosen = self
            .fields
            .iter()
            .find_map(|field| lookup(doc, field).filter(|v| !v.is_null()));
        match chosen {
            Some(value) => parse_stamp(value),
            None => doc.get("_id").and_then(parse_stamp),
        }
    }

    pub fn in_window(&self, doc: &Value, window: &Window) -> bool {
        self.effective_stamp(doc)
            .map_or(false, |stamp| window.contains(stamp))
    }
}

/// Resolves a dotted path such as `meta.updatedAt`
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, part| node.get(part))
}

/// Coerces an extended-JSON value into a date
///
/// Accepts `{"$date": ...}` in canonical or relaxed form, `{"$oid": ...}`
/// (the ObjectId creation second), RFC 3339 strings and integer milliseconds.
pub fn parse_stamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(from_millis),
        Value::Object(map) => {
            if let Some(date) = map.get("$date") {
                return match date {
                    Value::Object(inner) => inner
                        .get("$numberLong")
                        .and_then(Value::as_str)
                        .and_then(|s| s.parse::<i64>().ok())
                        .and_then(from_millis),
                    other => parse_stamp(other),
                };
            }
            map.get("$oid")
                .and_then(Value::as_str)
                .and_then(object_id_time)
        }
        _ => None,
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Creation time embedded in the first four bytes of an ObjectId
pub fn object_id_time(hex: &str) -> Option<DateTime<Utc>> {
    if hex.len() != 24 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let seconds = u32::from_str_radix(&hex[..8], 16).ok()?;
    Utc.timestamp_opt(i64::from(seconds), 0).single()
}

/// Collection ignore list
///
/// Patterns are exact names or globs where `*` matches any run of characters.
#[derive(Debug, Clone)]
pub struct CollectionFilter {
    patterns: Vec<Regex>,
}

impl CollectionFilter {
    /// Compiles the global patterns together with the profile's own
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a String>) -> Self {
        let patterns = patterns
            .into_iter()
            .filter_map(|p| {
                let escaped = regex::escape(p.trim()).replace(r"\*", ".*");
                Regex::new(&format!("^{escaped}$")).ok()
            })
            .collect();
        Self { patterns }
    }

    pub fn for_source(global: &[String], source: &SourceProfile) -> Self {
        Self::new(global.iter().chain(source.ignore.iter()))
    }

    pub fn is_ignored(&self, collection: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(collection))
    }

    /// Drops ignored names and sorts the rest
    pub fn apply(&self, collections: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut kept: Vec<String> = collections
            .into_iter()
            .filter(|c| !self.is_ignored(c))
            .collect();
        kept.sort();
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use crate::domain::profile::{StampFields, StampOverrides};
    use serde_json::json;

    fn source(update: Option<&str>, insert: Option<&str>) -> SourceProfile {
        SourceProfile {
            name: "s1".to_string(),
            url: secret_string("mongodb://localhost".to_string()),
            ignore: vec!["audit_*".to_string()],
            stamps: StampOverrides {
                fields: StampFields {
                    update_field: update.map(str::to_string),
                    insert_field: insert.map(str::to_string),
                },
                collections: Default::default(),
            },
        }
    }

    fn resolver() -> StampResolver {
        StampResolver::new(StampDefaults {
            update_fields: vec!["updatedAt".to_string()],
            insert_fields: vec!["createdAt".to_string()],
        })
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_plan_order() {
        let plan = resolver().plan(&source(Some("modified"), Some("inserted")), "orders");
        assert_eq!(
            plan.fields(),
            &["modified", "updatedAt", "inserted", "createdAt"]
        );
    }

    #[test]
    fn test_plan_deduplicates() {
        let plan = resolver().plan(&source(Some("updatedAt"), None), "orders");
        assert_eq!(plan.fields(), &["updatedAt", "createdAt"]);
    }

    #[test]
    fn test_first_non_null_wins() {
        let plan = resolver().plan(&source(None, None), "orders");
        let doc = json!({
            "_id": {"$oid": "000000010000000000000000"},
            "updatedAt": null,
            "createdAt": "2024-01-01T00:00:00Z"
        });
        assert_eq!(
            plan.effective_stamp(&doc),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_falls_back_to_object_id() {
        let plan = resolver().plan(&source(None, None), "orders");
        let doc = json!({"_id": {"$oid": "65a0f8800000000000000000"}});
        assert_eq!(plan.effective_stamp(&doc), Some(at(0x65a0f880)));
    }

    #[test]
    fn test_unconvertible_stamp_is_excluded() {
        let plan = resolver().plan(&source(None, None), "orders");
        let doc = json!({"_id": {"$oid": "65a0f8800000000000000000"}, "updatedAt": "yesterday"});
        assert_eq!(plan.effective_stamp(&doc), None);
    }

    #[test]
    fn test_extended_json_dates() {
        assert_eq!(
            parse_stamp(&json!({"$date": "1970-01-01T00:00:10Z"})),
            Some(at(10))
        );
        assert_eq!(
            parse_stamp(&json!({"$date": {"$numberLong": "20000"}})),
            Some(at(20))
        );
        assert_eq!(parse_stamp(&json!(30000)), Some(at(30)));
        assert_eq!(parse_stamp(&json!(true)), None);
    }

    #[test]
    fn test_nested_field_path() {
        let plan = StampPlan::new(vec!["meta.changed".to_string()]);
        let doc = json!({"meta": {"changed": {"$date": "2024-03-01T12:00:00Z"}}});
        assert!(plan.effective_stamp(&doc).is_some());
    }

    #[test]
    fn test_window_membership() {
        let plan = StampPlan::new(vec!["updatedAt".to_string()]);
        let window = Window {
            begin: at(100),
            end: at(200),
        };
        assert!(!plan.in_window(&json!({"updatedAt": 100_000}), &window));
        assert!(plan.in_window(&json!({"updatedAt": 200_000}), &window));
    }

    #[test]
    fn test_collection_filter() {
        let filter = CollectionFilter::for_source(
            &["system.*".to_string()],
            &source(None, None),
        );
        assert!(filter.is_ignored("system.views"));
        assert!(filter.is_ignored("audit_2024"));
        assert!(!filter.is_ignored("orders"));
        assert!(!filter.is_ignored("systemic"));
        assert_eq!(
            filter.apply(vec![
                "users".to_string(),
                "audit_log".to_string(),
                "orders".to_string()
            ]),
            vec!["orders".to_string(), "users".to_string()]
        );
    }
}
