use crate::document::SourceDescription;
use crate::pagination::PaginationState;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerPhase {
    Closed,
    /// A document was handed over; its load job has not committed yet.
    Opening,
    Open,
}

impl ViewerPhase {
    /// Whether the viewer is on screen and owns shortcuts.
    pub fn is_visible(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// Serializable view of the viewer for hosts and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerSnapshot {
    pub phase: ViewerPhase,
    pub generation: u64,
    pub title: Option<String>,
    pub source: Option<SourceDescription>,
    pub display_url: Option<String>,
    pub current_page: u32,
    pub total_pages: Option<u32>,
    pub scale: f32,
    pub zoom_percent: u32,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_fullscreen: bool,
}

impl ViewerSnapshot {
    pub fn closed(generation: u64, is_fullscreen: bool) -> Self {
        Self::from_pagination(
            ViewerPhase::Closed,
            generation,
            &PaginationState::default(),
            is_fullscreen,
        )
        .with_loading(false)
    }

    pub fn from_pagination(
        phase: ViewerPhase,
        generation: u64,
        pagination: &PaginationState,
        is_fullscreen: bool,
    ) -> Self {
        Self {
            phase,
            generation,
            title: None,
            source: None,
            display_url: None,
            current_page: pagination.current_page(),
            total_pages: pagination.total_pages(),
            scale: pagination.scale(),
            zoom_percent: pagination.zoom_percent(),
            is_loading: pagination.is_loading(),
            error: pagination.error().map(ToOwned::to_owned),
            is_fullscreen,
        }
    }

    fn with_loading(mut self, is_loading: bool) -> Self {
        self.is_loading = is_loading;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_snapshot_is_idle() {
        let snapshot = ViewerSnapshot::closed(3, false);
        assert_eq!(snapshot.phase, ViewerPhase::Closed);
        assert!(!snapshot.is_loading);
        assert_eq!(snapshot.current_page, 1);
        assert_eq!(snapshot.total_pages, None);
    }

    #[test]
    fn snapshot_serializes_phase_in_snake_case() {
        let mut pagination = PaginationState::new();
        pagination.on_document_loaded(4);
        let snapshot = ViewerSnapshot::from_pagination(ViewerPhase::Open, 1, &pagination, true);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["phase"], "open");
        assert_eq!(json["total_pages"], 4);
        assert_eq!(json["zoom_percent"], 100);
        assert_eq!(json["is_fullscreen"], true);
    }

    #[test]
    fn only_closed_is_hidden() {
        assert!(!ViewerPhase::Closed.is_visible());
        assert!(ViewerPhase::Opening.is_visible());
        assert!(ViewerPhase::Open.is_visible());
    }
}
