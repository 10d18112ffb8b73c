use crate::{Envelope, LocalStore, StorageError};
use scorebook_doc_model::{sort_by_start, EventId, NewPracticeEvent, OwnerId, PracticeEvent};
use serde::{Deserialize, Serialize};

const PRACTICE_SCHEMA_VERSION: u32 = 1;

/// CRUD over an owner's scheduled practice sessions.
pub trait PracticeEventStore: Send + Sync {
    /// Every event of `owner`, earliest start first.
    fn fetch_events(&self, owner: &OwnerId) -> Result<Vec<PracticeEvent>, StorageError>;

    /// Validate and store a new event; returns it with its assigned id.
    fn add_event(
        &self,
        owner: &OwnerId,
        event: &NewPracticeEvent,
    ) -> Result<PracticeEvent, StorageError>;

    /// Replace every field of the stored event with the same id.
    fn update_event(&self, owner: &OwnerId, event: &PracticeEvent) -> Result<(), StorageError>;

    fn delete_event(&self, owner: &OwnerId, id: &EventId) -> Result<(), StorageError>;

    /// Returns the event as stored afterwards.
    fn set_completed(
        &self,
        owner: &OwnerId,
        id: &EventId,
        completed: bool,
    ) -> Result<PracticeEvent, StorageError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PracticeEnvelope {
    version: u32,
    events: Vec<PracticeEvent>,
}

impl Envelope for PracticeEnvelope {
    const FILE_NAME: &'static str = "practice.json";
    const VERSION: u32 = PRACTICE_SCHEMA_VERSION;

    fn empty() -> Self {
        Self { version: Self::VERSION, events: Vec::new() }
    }

    fn version(&self) -> u32 {
        self.version
    }
}

fn find_mut<'a>(
    envelope: &'a mut PracticeEnvelope,
    owner: &OwnerId,
    id: &EventId,
) -> Result<&'a mut PracticeEvent, StorageError> {
    envelope
        .events
        .iter_mut()
        .find(|event| event.id == *id && event.owner_id == *owner)
        .ok_or_else(|| StorageError::EventNotFound(id.clone()))
}

impl PracticeEventStore for LocalStore {
    fn fetch_events(&self, owner: &OwnerId) -> Result<Vec<PracticeEvent>, StorageError> {
        let envelope: PracticeEnvelope = self.load()?;
        let mut events: Vec<_> =
            envelope.events.into_iter().filter(|event| event.owner_id == *owner).collect();
        sort_by_start(&mut events);
        Ok(events)
    }

    fn add_event(
        &self,
        owner: &OwnerId,
        event: &NewPracticeEvent,
    ) -> Result<PracticeEvent, StorageError> {
        let event = event.clone().validated()?.into_event(EventId::generate(), owner.clone());

        self.modify(|envelope: &mut PracticeEnvelope| {
            envelope.events.push(event.clone());
            tracing::debug!(%owner, id = %event.id, "scheduled practice event");
            Ok(event)
        })
    }

    fn update_event(&self, owner: &OwnerId, event: &PracticeEvent) -> Result<(), StorageError> {
        let mut updated = event.clone().validated()?;
        updated.owner_id = owner.clone();

        self.modify(|envelope: &mut PracticeEnvelope| {
            let stored = find_mut(envelope, owner, &updated.id)?;
            *stored = updated;
            Ok(())
        })
    }

    fn delete_event(&self, owner: &OwnerId, id: &EventId) -> Result<(), StorageError> {
        self.modify(|envelope: &mut PracticeEnvelope| {
            let before = envelope.events.len();
            envelope.events.retain(|event| !(event.id == *id && event.owner_id == *owner));
            if envelope.events.len() == before {
                return Err(StorageError::EventNotFound(id.clone()));
            }
            Ok(())
        })
    }

    fn set_completed(
        &self,
        owner: &OwnerId,
        id: &EventId,
        completed: bool,
    ) -> Result<PracticeEvent, StorageError> {
        self.modify(|envelope: &mut PracticeEnvelope| {
            let event = find_mut(envelope, owner, id)?;
            event.is_completed = completed;
            Ok(event.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use scorebook_doc_model::{ItemId, ValidationError};
    use std::fs;

    fn owner() -> OwnerId {
        OwnerId::from("owner-1")
    }

    fn store() -> (tempfile::TempDir, LocalStore) {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = LocalStore::with_root(temp.path());
        (temp, store)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).single().expect("valid timestamp")
    }

    fn session(title: &str, day: u32, hour: u32) -> NewPracticeEvent {
        NewPracticeEvent::new(title, at(day, hour), at(day, hour) + Duration::minutes(45))
    }

    #[test]
    fn fetch_events_is_empty_without_a_file() {
        let (temp, store) = store();
        assert!(store.fetch_events(&owner()).expect("fetch").is_empty());
        assert!(!temp.path().join("practice.json").exists());
    }

    #[test]
    fn added_events_come_back_in_start_order() {
        let (_temp, store) = store();
        store.add_event(&owner(), &session("Scales", 12, 9)).expect("add scales");
        store.add_event(&owner(), &session("Etude", 4, 18)).expect("add etude");
        store
            .add_event(&OwnerId::from("someone-else"), &session("Other", 1, 8))
            .expect("add other");

        let titles: Vec<_> =
            store.fetch_events(&owner()).expect("fetch").into_iter().map(|e| e.title).collect();
        assert_eq!(titles, ["Etude", "Scales"]);
    }

    #[test]
    fn add_assigns_id_and_owner() {
        let (_temp, store) = store();
        let piece = ItemId::from("piece-1");
        let stored = store
            .add_event(&owner(), &session(" Sonata ", 5, 10).for_sheet(piece.clone()))
            .expect("add should succeed");

        assert!(!stored.id.as_str().is_empty());
        assert_eq!(stored.owner_id, owner());
        assert_eq!(stored.title, "Sonata");
        assert_eq!(stored.sheet_music_id, Some(piece));
        assert_eq!(store.fetch_events(&owner()).expect("fetch"), [stored]);
    }

    #[test]
    fn add_rejects_invalid_events() {
        let (_temp, store) = store();
        let backwards = NewPracticeEvent::new("Scales", at(5, 10), at(5, 9));
        assert!(matches!(
            store.add_event(&owner(), &backwards),
            Err(StorageError::Invalid(ValidationError::EndsBeforeStart))
        ));

        let mut colored = session("Scales", 5, 10);
        colored.color = "blue".into();
        assert!(matches!(
            store.add_event(&owner(), &colored),
            Err(StorageError::Invalid(ValidationError::InvalidColor))
        ));
        assert!(store.fetch_events(&owner()).expect("fetch").is_empty());
    }

    #[test]
    fn update_replaces_fields_of_the_owners_event() {
        let (_temp, store) = store();
        let mut stored = store.add_event(&owner(), &session("Scales", 5, 10)).expect("add");

        stored.title = "Arpeggios".into();
        stored.start_time = at(6, 8);
        stored.end_time = at(6, 9);
        store.update_event(&owner(), &stored).expect("update should succeed");
        assert_eq!(store.fetch_events(&owner()).expect("fetch"), [stored.clone()]);

        assert!(matches!(
            store.update_event(&OwnerId::from("someone-else"), &stored),
            Err(StorageError::EventNotFound(_))
        ));
    }

    #[test]
    fn completion_can_be_toggled_back() {
        let (_temp, store) = store();
        let stored = store.add_event(&owner(), &session("Scales", 5, 10)).expect("add");

        let done = store.set_completed(&owner(), &stored.id, true).expect("complete");
        assert!(done.is_completed);
        assert!(store.fetch_events(&owner()).expect("fetch")[0].is_completed);

        let undone = store.set_completed(&owner(), &stored.id, false).expect("reopen");
        assert!(!undone.is_completed);
        assert!(matches!(
            store.set_completed(&owner(), &EventId::from("missing"), true),
            Err(StorageError::EventNotFound(_))
        ));
    }

    #[test]
    fn delete_removes_only_the_owners_event() {
        let (_temp, store) = store();
        let stored = store.add_event(&owner(), &session("Scales", 5, 10)).expect("add");

        assert!(matches!(
            store.delete_event(&OwnerId::from("someone-else"), &stored.id),
            Err(StorageError::EventNotFound(_))
        ));
        store.delete_event(&owner(), &stored.id).expect("delete should succeed");
        assert!(store.fetch_events(&owner()).expect("fetch").is_empty());
    }

    #[test]
    fn events_and_library_live_in_separate_files() {
        let (temp, store) = store();
        store.add_event(&owner(), &session("Scales", 5, 10)).expect("add");

        assert!(temp.path().join("practice.json").exists());
        assert!(!temp.path().join("library.json").exists());
    }

    #[test]
    fn stored_events_without_color_get_the_default() {
        let (temp, store) = store();
        fs::write(
            temp.path().join("practice.json"),
            r#"{"version": 1, "events": [{
                "id": "e1", "owner_id": "owner-1", "title": "Scales",
                "start_time": "2024-03-05T10:00:00Z", "end_time": "2024-03-05T11:00:00Z",
                "is_completed": false
            }]}"#,
        )
        .expect("write");

        let events = store.fetch_events(&owner()).expect("fetch");
        assert_eq!(events[0].color, scorebook_doc_model::DEFAULT_EVENT_COLOR);
        assert_eq!(events[0].description, None);
    }

    #[test]
    fn rejects_unknown_practice_schema_version() {
        let (temp, store) = store();
        fs::write(temp.path().join("practice.json"), r#"{"version": 7, "events": []}"#)
            .expect("write");

        assert!(matches!(store.fetch_events(&owner()), Err(StorageError::UnsupportedVersion(7))));
    }
}
