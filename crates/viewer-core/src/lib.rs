//! Platform-free viewer state: document references, pagination and zoom,
//! the shortcut keymap and the serializable session snapshot.

pub mod document;
pub mod keymap;
pub mod pagination;
pub mod session;

pub use document::{DocumentReference, SourceDescription};
pub use keymap::{KeyChord, Keymap, KeymapError, ViewerAction};
pub use pagination::{PaginationState, DEFAULT_SCALE, MAX_SCALE, MIN_SCALE, ZOOM_STEP};
pub use session::{ViewerPhase, ViewerSnapshot};
