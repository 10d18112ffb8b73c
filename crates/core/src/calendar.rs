//! The practice calendar
//!
//! Same shape as the library: the store is written first and the
//! in-memory list only follows once it accepted the change.

use chrono::{DateTime, NaiveDate, Utc};
use scorebook_doc_model::{
    sort_by_start, DayCell, EventId, ItemId, MonthGrid, NewPracticeEvent, OwnerId, PracticeEvent,
    ValidationError,
};
use scorebook_storage::{PracticeEventStore, StorageError};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("practice event {0} not found")]
    NotFound(EventId),
}

/// Row shape for hosts and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_music_id: Option<String>,
    pub color: String,
}

impl From<&PracticeEvent> for EventSummary {
    fn from(event: &PracticeEvent) -> Self {
        Self {
            id: event.id.to_string(),
            title: event.title.clone(),
            description: event.description.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            is_completed: event.is_completed,
            sheet_music_id: event.sheet_music_id.as_ref().map(ToString::to_string),
            color: event.color.clone(),
        }
    }
}

/// One day of a month view: the first few events plus how many were left out.
#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub in_month: bool,
    pub is_today: bool,
    pub events: Vec<EventSummary>,
    pub more: usize,
}

impl From<&DayCell<'_>> for DaySummary {
    fn from(cell: &DayCell<'_>) -> Self {
        Self {
            date: cell.date,
            in_month: cell.in_month,
            is_today: cell.is_today,
            events: cell.visible_events().iter().map(|event| EventSummary::from(*event)).collect(),
            more: cell.overflow(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthSummary {
    pub title: String,
    pub weeks: Vec<Vec<DaySummary>>,
}

pub struct PracticeCalendar {
    store: Arc<dyn PracticeEventStore>,
    owner: OwnerId,
    events: Vec<PracticeEvent>,
}

impl PracticeCalendar {
    pub fn load(store: Arc<dyn PracticeEventStore>, owner: OwnerId) -> Result<Self, CalendarError> {
        let events = store.fetch_events(&owner)?;
        Ok(Self { store, owner, events })
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Earliest start first.
    pub fn events(&self) -> &[PracticeEvent] {
        &self.events
    }

    pub fn get(&self, id: &EventId) -> Option<&PracticeEvent> {
        self.events.iter().find(|event| event.id == *id)
    }

    /// Sessions scheduled for one piece.
    pub fn events_for_sheet(&self, sheet: &ItemId) -> Vec<&PracticeEvent> {
        self.events.iter().filter(|event| event.sheet_music_id.as_ref() == Some(sheet)).collect()
    }

    pub fn reload(&mut self) -> Result<(), CalendarError> {
        self.events = self.store.fetch_events(&self.owner)?;
        Ok(())
    }

    pub fn add(&mut self, event: NewPracticeEvent) -> Result<&PracticeEvent, CalendarError> {
        let event = event.validated()?;
        let stored = self.store.add_event(&self.owner, &event)?;
        tracing::info!(id = %stored.id, title = stored.title.as_str(), "scheduled practice");

        let id = stored.id.clone();
        self.events.push(stored);
        sort_by_start(&mut self.events);
        let index = self.index_of(&id)?;
        Ok(&self.events[index])
    }

    /// Replace the stored fields of `event`, matched by id.
    pub fn update(&mut self, event: PracticeEvent) -> Result<(), CalendarError> {
        let mut event = event.validated()?;
        let index = self.index_of(&event.id)?;
        event.owner_id = self.owner.clone();

        self.store.update_event(&self.owner, &event)?;
        tracing::debug!(id = %event.id, "updated practice event");
        self.events[index] = event;
        sort_by_start(&mut self.events);
        Ok(())
    }

    /// Flip the completed flag; returns the new value.
    pub fn toggle_completion(&mut self, id: &EventId) -> Result<bool, CalendarError> {
        let index = self.index_of(id)?;
        let completed = !self.events[index].is_completed;

        let stored = self.store.set_completed(&self.owner, id, completed)?;
        self.events[index] = stored;
        Ok(completed)
    }

    pub fn remove(&mut self, id: &EventId) -> Result<PracticeEvent, CalendarError> {
        let index = self.index_of(id)?;
        self.store.delete_event(&self.owner, id)?;
        tracing::info!(%id, "removed practice event");
        Ok(self.events.remove(index))
    }

    /// The month grid with each day's sessions.
    pub fn month(&self, grid: MonthGrid, today: NaiveDate) -> MonthSummary {
        let weeks = grid
            .layout(&self.events, today)
            .iter()
            .map(|week| week.iter().map(DaySummary::from).collect())
            .collect();
        MonthSummary { title: grid.title(), weeks }
    }

    fn index_of(&self, id: &EventId) -> Result<usize, CalendarError> {
        self.events
            .iter()
            .position(|event| event.id == *id)
            .ok_or_else(|| CalendarError::NotFound(id.clone()))
    }
}
