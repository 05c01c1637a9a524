//! Tiled multi-resolution image pyramids.
//!
//! A [`PyramidStore`] opens one pyramidal TIFF and serves its tiles as
//! canonical pixel buffers. A [`PyramidRegistry`] keeps opened stores cached
//! in front of a [`ContentSource`] such as [`LocalContentSource`].
//!
//! Level 0 is the full-resolution image; each following level is no larger
//! than the one before it. [`select_level`] picks the level to display for a
//! given on-screen size.

mod level;
mod local_source;
mod registry;
mod store;

#[cfg(test)]
pub(crate) mod test_tiff;

pub use level::{select_level, LevelGeometry, LevelPolicy};
pub use local_source::LocalContentSource;
pub use registry::{ContentList, ContentSource, PyramidRegistry, DEFAULT_PYRAMID_CACHE_CAPACITY};
pub use store::{LevelImage, PyramidStore};
