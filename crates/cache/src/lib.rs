//! Scorebook cache library
//!
//! Thumbnail entries for the sheet-music list.

pub mod thumbnails;

pub use thumbnails::{
    BeginOutcome, Thumbnail, ThumbnailCache, ThumbnailCacheStats, ThumbnailState, ThumbnailView,
};
