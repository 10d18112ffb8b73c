use serde::Serialize;

pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 2.0;
pub const DEFAULT_SCALE: f32 = 1.0;
pub const ZOOM_STEP: f32 = 0.2;

/// Page position, zoom and load status of an open document.
///
/// Every transition returns whether anything changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginationState {
    current_page: u32,
    total_pages: Option<u32>,
    scale: f32,
    is_loading: bool,
    error: Option<String>,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: None,
            scale: DEFAULT_SCALE,
            is_loading: true,
            error: None,
        }
    }
}

impl PaginationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.scale * 100.0).round() as u32
    }

    pub fn can_go_next(&self) -> bool {
        self.total_pages.is_some_and(|total| self.current_page < total)
    }

    pub fn can_go_prev(&self) -> bool {
        self.current_page > 1
    }

    /// Back to page 1 at 100%, loading, no error.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn next_page(&mut self) -> bool {
        if !self.can_go_next() {
            return false;
        }
        self.current_page += 1;
        true
    }

    pub fn prev_page(&mut self) -> bool {
        if !self.can_go_prev() {
            return false;
        }
        self.current_page -= 1;
        true
    }

    /// Shift the scale by `delta`, clamped to `MIN_SCALE..=MAX_SCALE`.
    ///
    /// The result is rounded to two decimals so that repeated steps land on
    /// 1.2, 1.4, ... instead of accumulating float error.
    pub fn set_zoom(&mut self, delta: f32) -> bool {
        if !delta.is_finite() {
            return false;
        }

        let next = round_scale((self.scale + delta).clamp(MIN_SCALE, MAX_SCALE));
        if next == self.scale {
            return false;
        }
        self.scale = next;
        true
    }

    pub fn zoom_in(&mut self) -> bool {
        self.set_zoom(ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.set_zoom(-ZOOM_STEP)
    }

    pub fn on_document_loaded(&mut self, total_pages: u32) {
        self.total_pages = Some(total_pages);
        self.current_page = self.current_page.clamp(1, total_pages.max(1));
        self.is_loading = false;
        self.error = None;
    }

    /// Record a load failure. Terminal until the document is reopened.
    pub fn on_load_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.is_loading = false;
    }
}

fn round_scale(scale: f32) -> f32 {
    (scale * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(total: u32) -> PaginationState {
        let mut state = PaginationState::new();
        state.on_document_loaded(total);
        state
    }

    #[test]
    fn next_page_clamps_at_last_page() {
        let mut state = loaded(3);
        assert_eq!(state.current_page(), 1);

        assert!(state.next_page());
        assert!(state.next_page());
        assert_eq!(state.current_page(), 3);

        assert!(!state.next_page());
        assert_eq!(state.current_page(), 3);
    }

    #[test]
    fn prev_page_is_noop_on_first_page() {
        let mut state = loaded(2);
        assert!(!state.prev_page());
        assert_eq!(state.current_page(), 1);
    }

    #[test]
    fn navigation_waits_for_page_count() {
        let mut state = PaginationState::new();
        assert!(!state.next_page());
        assert_eq!(state.total_pages(), None);
    }

    #[test]
    fn zoom_steps_land_on_exact_values_and_clamp() {
        let mut state = PaginationState::new();
        state.set_zoom(ZOOM_STEP);
        assert_eq!(state.scale(), 1.2);

        for _ in 0..5 {
            state.set_zoom(ZOOM_STEP);
        }
        assert_eq!(state.scale(), MAX_SCALE);
        assert_eq!(state.zoom_percent(), 200);
    }

    #[test]
    fn zoom_never_leaves_bounds() {
        let mut state = PaginationState::new();
        for delta in [-100.0, 0.3, 55.0, -0.7, f32::INFINITY, f32::NAN, -1e9] {
            state.set_zoom(delta);
            assert!((MIN_SCALE..=MAX_SCALE).contains(&state.scale()), "{delta}");
        }

        state.set_zoom(-10.0);
        assert_eq!(state.scale(), MIN_SCALE);
        assert!(!state.zoom_out());
    }

    #[test]
    fn load_completion_clears_error_and_clamps_page() {
        let mut state = loaded(5);
        for _ in 0..4 {
            state.next_page();
        }
        state.on_load_error("boom");
        assert!(!state.is_loading());
        assert_eq!(state.error(), Some("boom"));

        state.on_document_loaded(2);
        assert_eq!(state.error(), None);
        assert_eq!(state.current_page(), 2);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut state = loaded(4);
        state.next_page();
        state.zoom_in();
        state.reset();
        assert_eq!(state, PaginationState::default());
        assert!(state.is_loading());
    }
}
