//! Practice sessions and the month view they are laid out in.

use crate::{ItemId, OwnerId, ValidationError};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Color of events that never picked one.
pub const DEFAULT_EVENT_COLOR: &str = "#3B82F6";

/// Events listed per day cell before the rest collapse into a count.
pub const VISIBLE_EVENTS_PER_DAY: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A scheduled practice session, optionally tied to a piece in the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeEvent {
    pub id: EventId,
    pub owner_id: OwnerId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_music_id: Option<ItemId>,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    DEFAULT_EVENT_COLOR.to_owned()
}

impl PracticeEvent {
    /// Day the session starts on, in UTC.
    pub fn day(&self) -> NaiveDate {
        self.start_time.date_naive()
    }

    /// Same checks as a new event, applied to an edited one.
    pub fn validated(self) -> Result<Self, ValidationError> {
        let fields = NewPracticeEvent {
            title: self.title,
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            is_completed: self.is_completed,
            sheet_music_id: self.sheet_music_id,
            color: self.color,
        }
        .validated()?;
        Ok(fields.into_event(self.id, self.owner_id))
    }
}

/// Fields of an event before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPracticeEvent {
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_completed: bool,
    pub sheet_music_id: Option<ItemId>,
    pub color: String,
}

impl NewPracticeEvent {
    pub fn new(
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            start_time,
            end_time,
            is_completed: false,
            sheet_music_id: None,
            color: default_color(),
        }
    }

    pub fn for_sheet(mut self, id: ItemId) -> Self {
        self.sheet_music_id = Some(id);
        self
    }

    /// Trims text fields, drops a blank description and checks the time span
    /// and color.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.title = self.title.trim().to_owned();
        if self.title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        self.description =
            self.description.map(|d| d.trim().to_owned()).filter(|d| !d.is_empty());
        if self.end_time < self.start_time {
            return Err(ValidationError::EndsBeforeStart);
        }
        if !is_hex_color(&self.color) {
            return Err(ValidationError::InvalidColor);
        }
        Ok(self)
    }

    pub fn into_event(self, id: EventId, owner_id: OwnerId) -> PracticeEvent {
        PracticeEvent {
            id,
            owner_id,
            title: self.title,
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            is_completed: self.is_completed,
            sheet_music_id: self.sheet_music_id,
            color: self.color,
        }
    }
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Earliest start first; ties keep their order.
pub fn sort_by_start(events: &mut [PracticeEvent]) {
    events.sort_by_key(|event| event.start_time);
}

/// A calendar month laid out as whole weeks, Sunday first.
///
/// Leading and trailing cells belong to the neighbouring months so every
/// week row is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthGrid {
    first: NaiveDate,
}

impl MonthGrid {
    /// `None` for a month outside 1..=12 or a year chrono cannot represent.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first| Self { first })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self { first: date.with_day(1).unwrap_or(date) }
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> u32 {
        self.first.month()
    }

    /// e.g. `March 2024`.
    pub fn title(&self) -> String {
        self.first.format("%B %Y").to_string()
    }

    pub fn previous(&self) -> Self {
        self.first.checked_sub_months(Months::new(1)).map_or(*self, Self::containing)
    }

    pub fn next(&self) -> Self {
        self.first.checked_add_months(Months::new(1)).map_or(*self, Self::containing)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().first.pred_opt().filter(|last| *last >= self.first).unwrap_or(self.first)
    }

    pub fn in_month(&self, date: NaiveDate) -> bool {
        date.year() == self.year() && date.month() == self.month()
    }

    /// First and last cell of the grid.
    pub fn span(&self) -> (NaiveDate, NaiveDate) {
        let lead = u64::from(self.first.weekday().num_days_from_sunday());
        let last = self.last_day();
        let trail = 6 - u64::from(last.weekday().num_days_from_sunday());
        let start = self.first.checked_sub_days(Days::new(lead)).unwrap_or(self.first);
        let end = last.checked_add_days(Days::new(trail)).unwrap_or(last);
        (start, end)
    }

    pub fn weeks(&self) -> Vec<[NaiveDate; 7]> {
        let (start, end) = self.span();
        let mut weeks = Vec::with_capacity(6);
        let mut day = start;
        while day <= end {
            let mut week = [day; 7];
            for (offset, cell) in week.iter_mut().enumerate() {
                *cell = day.checked_add_days(Days::new(offset as u64)).unwrap_or(day);
            }
            weeks.push(week);
            match day.checked_add_days(Days::new(7)) {
                Some(next) => day = next,
                None => break,
            }
        }
        weeks
    }

    /// Cells with the events starting on each day, earliest first.
    pub fn layout<'a>(
        &self,
        events: &'a [PracticeEvent],
        today: NaiveDate,
    ) -> Vec<Vec<DayCell<'a>>> {
        let mut sorted: Vec<&PracticeEvent> = events.iter().collect();
        sorted.sort_by_key(|event| event.start_time);

        self.weeks()
            .into_iter()
            .map(|week| {
                week.into_iter()
                    .map(|date| DayCell {
                        date,
                        in_month: self.in_month(date),
                        is_today: date == today,
                        events: sorted.iter().copied().filter(|e| e.day() == date).collect(),
                    })
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCell<'a> {
    pub date: NaiveDate,
    pub in_month: bool,
    pub is_today: bool,
    pub events: Vec<&'a PracticeEvent>,
}

impl DayCell<'_> {
    pub fn visible_events(&self) -> &[&PracticeEvent] {
        &self.events[..self.events.len().min(VISIBLE_EVENTS_PER_DAY)]
    }

    /// How many events the cell folds into "+N more".
    pub fn overflow(&self) -> usize {
        self.events.len().saturating_sub(VISIBLE_EVENTS_PER_DAY)
    }
}
