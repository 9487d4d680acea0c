use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{now, ListQuery, Marker, MarkerCollection, MarkerInput, MarkerType, Stats};
use crate::store::RecordStore;
use crate::validation::{as_number, as_text, Candidate, Validator};

/// Maximum number of markers a single list call may return.
pub const MAX_LIMIT: usize = 1000;

/// Marker operations over a record store.
///
/// Every operation loads the collection, works on its own copy and, for
/// writes, saves it back. A lock is held across the whole cycle so that two
/// writers in this process cannot overwrite each other's changes.
pub struct MarkerService {
    store: Arc<dyn RecordStore>,
    lock: Mutex<()>,
}

impl MarkerService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load_for_write(&self, action: &'static str) -> Result<MarkerCollection, ServiceError> {
        self.store
            .load_for_write()
            .map_err(|source| ServiceError::Storage { action, source })
    }

    /// List markers, most recent first, with optional type/user filters and limit.
    pub fn list(&self, query: &ListQuery) -> Vec<Marker> {
        let collection = {
            let _guard = self.guard();
            self.store.load()
        };

        let kind = non_blank(&query.kind);
        let user_needle = non_blank(&query.user).map(str::to_lowercase);
        let mut markers: Vec<Marker> = collection
            .markers
            .into_iter()
            .filter(|m| match kind {
                Some(kind) => m.kind.as_str() == kind,
                None => true,
            })
            .filter(|m| match user_needle.as_deref() {
                Some(needle) => m.user.to_lowercase().contains(needle),
                None => true,
            })
            .collect();

        markers.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        if let Some(limit) = query.limit {
            markers.truncate(limit.min(MAX_LIMIT));
        }
        markers
    }

    pub fn get(&self, id: &str) -> Result<Marker, ServiceError> {
        let _guard = self.guard();
        self.store
            .load()
            .markers
            .into_iter()
            .find(|m| m.id == id)
            .ok_or(ServiceError::NotFound)
    }

    /// Validate and append a new marker.
    pub fn create(&self, input: &MarkerInput) -> Result<Marker, ServiceError> {
        let candidate = Candidate {
            kind: as_text(input.kind.as_ref()),
            description: as_text(input.description.as_ref()),
            lat: as_number(input.lat.as_ref()),
            lng: as_number(input.lng.as_ref()),
            user: as_text(input.user.as_ref()),
        };
        let marker = build_marker(&candidate, input.photo_url.clone().flatten())?;

        let _guard = self.guard();
        let mut collection = self.load_for_write("save")?;
        collection.markers.push(marker.clone());
        self.store
            .save(&collection)
            .map_err(|source| ServiceError::Storage {
                action: "save",
                source,
            })?;

        tracing::info!("Created {} marker {}", marker.kind, marker.id);
        Ok(marker)
    }

    /// Merge `input` over an existing marker. `id` and `timestamp` never change.
    pub fn update(&self, id: &str, input: &MarkerInput) -> Result<Marker, ServiceError> {
        let _guard = self.guard();
        let mut collection = self.load_for_write("update")?;
        let index = collection
            .markers
            .iter()
            .position(|m| m.id == id)
            .ok_or(ServiceError::NotFound)?;
        let existing = &collection.markers[index];

        let candidate = Candidate {
            kind: match provided(&input.kind) {
                Some(v) => as_text(Some(v)),
                None => Some(existing.kind.as_str()),
            },
            description: match provided(&input.description) {
                Some(v) => as_text(Some(v)),
                None => Some(existing.description.as_str()),
            },
            lat: match provided(&input.lat) {
                Some(v) => as_number(Some(v)),
                None => Some(existing.lat),
            },
            lng: match provided(&input.lng) {
                Some(v) => as_number(Some(v)),
                None => Some(existing.lng),
            },
            user: match provided(&input.user) {
                Some(v) => as_text(Some(v)),
                None => Some(existing.user.as_str()),
            },
        };
        let photo_url = match &input.photo_url {
            Some(photo_url) => photo_url.clone(),
            None => existing.photo_url.clone(),
        };

        let merged = build_marker(&candidate, photo_url)?;
        let updated = Marker {
            id: existing.id.clone(),
            timestamp: existing.timestamp,
            updated_at: Some(now()),
            ..merged
        };
        collection.markers[index] = updated.clone();

        self.store
            .save(&collection)
            .map_err(|source| ServiceError::Storage {
                action: "update",
                source,
            })?;

        tracing::info!("Updated marker {}", updated.id);
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let _guard = self.guard();
        let mut collection = self.load_for_write("delete")?;
        let initial_len = collection.markers.len();
        collection.markers.retain(|m| m.id != id);

        if collection.markers.len() == initial_len {
            return Err(ServiceError::NotFound);
        }

        self.store
            .save(&collection)
            .map_err(|source| ServiceError::Storage {
                action: "delete",
                source,
            })?;

        tracing::info!("Deleted marker {}", id);
        Ok(())
    }

    /// Per-type and per-user counts over the whole collection.
    pub fn stats(&self) -> Stats {
        let collection = {
            let _guard = self.guard();
            self.store.load()
        };

        let mut stats = Stats::default();
        for marker in &collection.markers {
            stats.global_stats.record(marker.kind);
            stats
                .user_stats
                .entry(marker.user.clone())
                .or_default()
                .record(marker.kind);
        }
        stats.total_users = stats.user_stats.len();
        stats.total_markers = collection.markers.len();
        stats
    }
}

/// A field present with a non-null value. Null counts as "not provided".
fn provided(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| !v.is_null())
}

/// A query parameter that is empty or whitespace only counts as absent.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Validate a candidate and build a normalized marker with a fresh id and timestamp.
fn build_marker(
    candidate: &Candidate<'_>,
    photo_url: Option<String>,
) -> Result<Marker, ServiceError> {
    let violations = Validator::validate(candidate);
    if !violations.is_empty() {
        return Err(ServiceError::Validation(violations));
    }

    match (
        candidate.kind.and_then(MarkerType::parse),
        candidate.description,
        candidate.lat,
        candidate.lng,
        candidate.user,
    ) {
        (Some(kind), Some(description), Some(lat), Some(lng), Some(user)) => Ok(Marker {
            id: Uuid::new_v4().to_string(),
            kind,
            description: description.trim().to_string(),
            lat,
            lng,
            user: user.trim().to_string(),
            photo_url: photo_url.filter(|p| !p.trim().is_empty()),
            timestamp: now(),
            updated_at: None,
        }),
        // Unreachable once validation passed; report it the same way.
        _ => Err(ServiceError::Validation(Validator::validate(candidate))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StorageError, ValidationError};
    use crate::store::memory::InMemoryStore;
    use crate::store::JsonFileStore;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn setup() -> (Arc<InMemoryStore>, MarkerService) {
        let store = Arc::new(InMemoryStore::new());
        let service = MarkerService::new(store.clone());
        (store, service)
    }

    fn input(value: serde_json::Value) -> MarkerInput {
        serde_json::from_value(value).unwrap()
    }

    fn oak() -> MarkerInput {
        input(json!({
            "type": "TREE",
            "description": "  Planted an oak ",
            "lat": 22.5,
            "lng": 88.4,
            "user": " Ada "
        }))
    }

    fn marker_at(id: &str, kind: MarkerType, user: &str, ts: &str) -> Marker {
        Marker {
            id: id.to_string(),
            kind,
            description: format!("{} by {}", kind, user),
            lat: 10.0,
            lng: 20.0,
            user: user.to_string(),
            photo_url: None,
            timestamp: ts.parse::<DateTime<Utc>>().unwrap(),
            updated_at: None,
        }
    }

    fn seeded() -> (Arc<InMemoryStore>, MarkerService) {
        let store = Arc::new(InMemoryStore::with_collection(MarkerCollection {
            markers: vec![
                marker_at("a", MarkerType::Tree, "Ada", "2024-01-01T10:00:00.000Z"),
                marker_at("b", MarkerType::Cleanup, "Grace", "2024-01-03T10:00:00.000Z"),
                marker_at("c", MarkerType::Tree, "ada@example.com", "2024-01-02T10:00:00.000Z"),
                marker_at("d", MarkerType::School, "Grace", "2024-01-04T10:00:00.000Z"),
                marker_at("e", MarkerType::Tree, "Linus", "2024-01-05T10:00:00.000Z"),
            ],
        }));
        let service = MarkerService::new(store.clone());
        (store, service)
    }

    fn ids(markers: &[Marker]) -> Vec<&str> {
        markers.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_create_normalizes_fields() {
        let (store, service) = setup();

        let marker = service.create(&oak()).unwrap();

        assert!(Uuid::parse_str(&marker.id).is_ok());
        assert_eq!(marker.kind, MarkerType::Tree);
        assert_eq!(marker.description, "Planted an oak");
        assert_eq!(marker.user, "Ada");
        assert_eq!(marker.photo_url, None);
        assert_eq!(marker.updated_at, None);
        assert_eq!(store.load().markers, vec![marker]);
    }

    #[test]
    fn test_create_then_get() {
        let (_, service) = setup();

        let created = service.create(&oak()).unwrap();
        let fetched = service.get(&created.id).unwrap();

        assert_eq!(fetched, created);
    }

    #[test]
    fn test_create_coerces_numeric_strings() {
        let (_, service) = setup();

        let marker = service
            .create(&input(json!({
                "type": "school",
                "description": "Talk on recycling",
                "lat": "-33.9",
                "lng": "18.4",
                "user": "Grace",
                "photoUrl": "blob:http://localhost/1234"
            })))
            .unwrap();

        assert_eq!(marker.lat, -33.9);
        assert_eq!(marker.lng, 18.4);
        assert_eq!(
            marker.photo_url.as_deref(),
            Some("blob:http://localhost/1234")
        );
    }

    #[test]
    fn test_create_reports_all_violations() {
        let (store, service) = setup();

        let err = service
            .create(&input(json!({ "type": "forest", "lat": 91, "lng": "east" })))
            .unwrap_err();

        match err {
            ServiceError::Validation(violations) => assert_eq!(
                violations,
                vec![
                    ValidationError::InvalidType,
                    ValidationError::MissingDescription,
                    ValidationError::InvalidLatitude,
                    ValidationError::InvalidLongitude,
                    ValidationError::MissingUser,
                ]
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(store.load().markers.is_empty());
    }

    #[test]
    fn test_create_storage_failure() {
        let (store, service) = setup();
        store.set_fail_writes(true);

        let err = service.create(&oak()).unwrap_err();

        assert!(matches!(err, ServiceError::Storage { action: "save", .. }));
        assert!(store.load().markers.is_empty());
    }

    #[test]
    fn test_get_missing() {
        let (_, service) = setup();
        assert!(matches!(service.get("nope"), Err(ServiceError::NotFound)));
    }

    #[test]
    fn test_list_sorted_most_recent_first() {
        let (_, service) = seeded();

        let markers = service.list(&ListQuery::default());

        assert_eq!(ids(&markers), vec!["e", "d", "b", "c", "a"]);
    }

    #[test]
    fn test_list_filter_by_type() {
        let (_, service) = seeded();

        let markers = service.list(&ListQuery {
            kind: Some("tree".to_string()),
            ..Default::default()
        });

        assert_eq!(ids(&markers), vec!["e", "c", "a"]);
        assert!(markers.iter().all(|m| m.kind == MarkerType::Tree));
    }

    #[test]
    fn test_list_unknown_type_matches_nothing() {
        let (_, service) = seeded();

        let markers = service.list(&ListQuery {
            kind: Some("volcano".to_string()),
            ..Default::default()
        });

        assert!(markers.is_empty());
    }

    #[test]
    fn test_list_filter_by_user_substring() {
        let (_, service) = seeded();

        let markers = service.list(&ListQuery {
            user: Some("ADA".to_string()),
            ..Default::default()
        });

        assert_eq!(ids(&markers), vec!["c", "a"]);
    }

    #[test]
    fn test_list_blank_filters_are_ignored() {
        let (_, service) = seeded();

        let markers = service.list(&ListQuery {
            kind: Some(String::new()),
            user: Some("  ".to_string()),
            limit: None,
        });

        assert_eq!(ids(&markers), vec!["e", "d", "b", "c", "a"]);
    }

    #[test]
    fn test_list_combined_filters_and_limit() {
        let (_, service) = seeded();

        let markers = service.list(&ListQuery {
            kind: Some("tree".to_string()),
            user: Some("a".to_string()),
            limit: Some(1),
        });
        assert_eq!(ids(&markers), vec!["c"]);

        let markers = service.list(&ListQuery {
            limit: Some(0),
            ..Default::default()
        });
        assert!(markers.is_empty());
    }

    #[test]
    fn test_update_merges_partial() {
        let (store, service) = seeded();

        let updated = service
            .update(
                "b",
                &input(json!({ "description": "  Cleared the riverbank ", "type": "TREE" })),
            )
            .unwrap();

        assert_eq!(updated.id, "b");
        assert_eq!(updated.kind, MarkerType::Tree);
        assert_eq!(updated.description, "Cleared the riverbank");
        assert_eq!(updated.user, "Grace");
        assert_eq!(updated.lat, 10.0);
        assert!(updated.updated_at.is_some());
        assert_eq!(
            updated.timestamp,
            "2024-01-03T10:00:00.000Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert!(store.load().markers.contains(&updated));
    }

    #[test]
    fn test_update_ignores_id_and_timestamp() {
        let (store, service) = seeded();

        let updated = service
            .update(
                "a",
                &input(json!({
                    "id": "hijacked",
                    "timestamp": "1999-01-01T00:00:00.000Z",
                    "user": "Ada Lovelace"
                })),
            )
            .unwrap();

        assert_eq!(updated.id, "a");
        assert_eq!(
            updated.timestamp,
            "2024-01-01T10:00:00.000Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert!(service.get("hijacked").is_err());
        assert_eq!(store.load().markers.len(), 5);
    }

    #[test]
    fn test_update_photo_url_set_and_cleared() {
        let (_, service) = seeded();

        let updated = service
            .update("a", &input(json!({ "photoUrl": "https://img/1.png" })))
            .unwrap();
        assert_eq!(updated.photo_url.as_deref(), Some("https://img/1.png"));

        let updated = service.update("a", &input(json!({ "user": "Ada" }))).unwrap();
        assert_eq!(updated.photo_url.as_deref(), Some("https://img/1.png"));

        let updated = service
            .update("a", &input(json!({ "photoUrl": null })))
            .unwrap();
        assert_eq!(updated.photo_url, None);
    }

    #[test]
    fn test_update_invalid_coordinates_no_mutation() {
        let (store, service) = seeded();
        let before = store.load();

        let err = service
            .update("a", &input(json!({ "lat": -91, "lng": 200 })))
            .unwrap_err();

        match err {
            ServiceError::Validation(v) => assert_eq!(
                v,
                vec![
                    ValidationError::InvalidLatitude,
                    ValidationError::InvalidLongitude
                ]
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(store.load(), before);
    }

    #[test]
    fn test_update_blank_description_rejected() {
        let (_, service) = seeded();

        let err = service
            .update("a", &input(json!({ "description": "   " })))
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_update_missing() {
        let (_, service) = seeded();

        assert!(matches!(
            service.update("zzz", &input(json!({ "user": "X" }))),
            Err(ServiceError::NotFound)
        ));
    }

    #[test]
    fn test_update_storage_failure_discards_change() {
        let (store, service) = seeded();
        store.set_fail_writes(true);

        let err = service
            .update("a", &input(json!({ "user": "Someone" })))
            .unwrap_err();

        assert!(matches!(err, ServiceError::Storage { action: "update", .. }));
        assert_eq!(service.get("a").unwrap().user, "Ada");
    }

    #[test]
    fn test_writes_refused_when_file_unparsable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.json");
        let content = r#"{"markers":[
            {"id":"keep-1","type":"tree","description":"Oak","lat":10.0,"lng":20.0,"user":"Ada","photoUrl":null,"timestamp":"2024-03-01T09:00:00.000Z"},
            {"id":"keep-2","type":"tree","description":"Elm","lat":"10.1","lng":20.0,"user":"Ada","photoUrl":null,"timestamp":"2024-03-02T09:00:00.000Z"}
        ]}"#;
        std::fs::write(&path, content).unwrap();
        let service = MarkerService::new(Arc::new(JsonFileStore::new(&path)));

        assert!(service.list(&ListQuery::default()).is_empty());
        assert!(matches!(
            service.create(&oak()),
            Err(ServiceError::Storage {
                action: "save",
                source: StorageError::Serialize(_)
            })
        ));
        assert!(matches!(
            service.update("keep-1", &input(json!({ "user": "Grace" }))),
            Err(ServiceError::Storage { action: "update", .. })
        ));
        assert!(matches!(
            service.delete("keep-1"),
            Err(ServiceError::Storage { action: "delete", .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_delete_twice() {
        let (store, service) = seeded();

        service.delete("c").unwrap();
        assert_eq!(store.load().markers.len(), 4);

        assert!(matches!(service.delete("c"), Err(ServiceError::NotFound)));
        assert_eq!(store.load().markers.len(), 4);
    }

    #[test]
    fn test_delete_storage_failure() {
        let (store, service) = seeded();
        store.set_fail_writes(true);

        assert!(matches!(
            service.delete("a"),
            Err(ServiceError::Storage { action: "delete", .. })
        ));
        assert_eq!(store.load().markers.len(), 5);
    }

    #[test]
    fn test_stats() {
        let (_, service) = seeded();

        let stats = service.stats();

        assert_eq!(stats.global_stats.trees, 3);
        assert_eq!(stats.global_stats.cleanups, 1);
        assert_eq!(stats.global_stats.schools, 1);
        assert_eq!(stats.global_stats.total, 5);
        assert_eq!(stats.total_users, 4);
        assert_eq!(stats.total_markers, 5);

        let grace = stats.user_stats["Grace"];
        assert_eq!(grace.cleanups, 1);
        assert_eq!(grace.schools, 1);
        assert_eq!(grace.trees, 0);
        assert_eq!(grace.total, 2);
    }

    #[test]
    fn test_stats_empty() {
        let (_, service) = setup();

        let stats = service.stats();

        assert_eq!(stats, Stats::default());
    }
}
