//! The value type flowing from a dependency fetch through the cache to a template.

use crate::_prelude::*;

/// A fetched dependency value.
///
/// Kept as a small closed enum rather than a raw `serde_json::Value` so that the "semantically
/// empty" check in [`crate::cache::Cache::save`] (spec §4.2) and the view's deep-equality check
/// (spec §4.1) have an unambiguous notion of "empty" per shape, not just JSON `null`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Value {
	/// No value (distinct from "never fetched" — see the cache empty-guard).
	Null,
	/// A single scalar string, e.g. a KV value or a secret field.
	String(String),
	/// An ordered list of strings, e.g. catalog service instance IDs.
	List(Vec<String>),
	/// An unordered string-keyed map, e.g. a KV prefix listing or secret data.
	Map(BTreeMap<String, String>),
	/// An arbitrary JSON document, e.g. a decoded secret payload or health check result.
	Json(JsonValue),
}
impl Value {
	/// Whether this value is "semantically empty": `Null`, an empty list, or an empty map.
	/// `Json(Value::Null)` and `String(String::new())` are also considered empty so that the
	/// cache's never-fetched/fetched-empty distinction (spec §4.2) holds for every dependency
	/// kind, not just the ones that happen to use `Value::Null`.
	pub fn is_empty(&self) -> bool {
		match self {
			Value::Null => true,
			Value::String(s) => s.is_empty(),
			Value::List(items) => items.is_empty(),
			Value::Map(map) => map.is_empty(),
			Value::Json(json) => json.is_null(),
		}
	}

	/// Render this value the way the template engine exposes it to `{{range}}` and scalar
	/// interpolation.
	pub fn as_list(&self) -> Vec<String> {
		match self {
			Value::Null => Vec::new(),
			Value::String(s) => vec![s.clone()],
			Value::List(items) => items.clone(),
			Value::Map(map) => map.keys().cloned().collect(),
			Value::Json(JsonValue::Array(items)) =>
				items.iter().map(json_to_display_string).collect(),
			Value::Json(other) => vec![json_to_display_string(other)],
		}
	}

	/// Render this value as a single display string, used for scalar template interpolation.
	pub fn as_display(&self) -> String {
		match self {
			Value::Null => String::new(),
			Value::String(s) => s.clone(),
			Value::List(items) => items.join(" "),
			Value::Map(map) =>
				map.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" "),
			Value::Json(json) => json_to_display_string(json),
		}
	}
}

fn json_to_display_string(value: &JsonValue) -> String {
	match value {
		JsonValue::String(s) => s.clone(),
		JsonValue::Null => String::new(),
		other => other.to_string(),
	}
}
