use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of environmental action a marker records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerType {
    Tree,
    Cleanup,
    School,
}

impl MarkerType {
    pub const ALL: [MarkerType; 3] = [MarkerType::Tree, MarkerType::Cleanup, MarkerType::School];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerType::Tree => "tree",
            MarkerType::Cleanup => "cleanup",
            MarkerType::School => "school",
        }
    }

    /// Case-insensitive parse. Surrounding whitespace is not accepted.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for MarkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current UTC time truncated to milliseconds.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// RFC 3339 with exactly three fractional digits and a `Z` suffix.
pub fn serialize_millis<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn serialize_millis_opt<S: Serializer>(
    ts: &Option<DateTime<Utc>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match ts {
        Some(ts) => serialize_millis(ts, s),
        None => s.serialize_none(),
    }
}

/// One logged environmental action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MarkerType,
    pub description: String,
    pub lat: f64,
    pub lng: f64,
    pub user: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(serialize_with = "serialize_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_millis_opt"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerCollection {
    #[serde(default)]
    pub markers: Vec<Marker>,
}

/// Loosely typed marker fields as they arrive in a request body.
///
/// Fields stay as raw JSON so that every rule can be checked and reported
/// together instead of failing at the first type mismatch.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerInput {
    #[serde(rename = "type")]
    pub kind: Option<Value>,
    pub description: Option<Value>,
    pub lat: Option<Value>,
    pub lng: Option<Value>,
    pub user: Option<Value>,
    /// `None` when absent, `Some(None)` when explicitly null.
    #[serde(default, deserialize_with = "present")]
    pub photo_url: Option<Option<String>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Query parameters for listing markers.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub user: Option<String>,
    pub limit: Option<usize>,
}

/// Response for creating or updating a marker.
#[derive(Debug, Serialize)]
pub struct MarkerResponse {
    pub success: bool,
    pub marker: Marker,
    pub message: &'static str,
}

/// Response for deleting a marker.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Per-type tally used for both the global and the per-user breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub trees: usize,
    pub cleanups: usize,
    pub schools: usize,
    pub total: usize,
}

impl TypeCounts {
    pub fn record(&mut self, kind: MarkerType) {
        match kind {
            MarkerType::Tree => self.trees += 1,
            MarkerType::Cleanup => self.cleanups += 1,
            MarkerType::School => self.schools += 1,
        }
        self.total += 1;
    }
}

/// Aggregate statistics over the collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub global_stats: TypeCounts,
    pub user_stats: BTreeMap<String, TypeCounts>,
    pub total_users: usize,
    pub total_markers: usize,
}
