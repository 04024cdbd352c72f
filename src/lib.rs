pub mod appearance;
pub mod chist_tracker;
pub mod error;
pub mod histogram;
pub mod hungarian;
pub mod object;
pub mod occlusion;
pub mod pixel_buffer;
pub mod rect;

pub use appearance::{extractor_for, AppearanceExtractor};
pub use chist_tracker::{
    ChistTracker, TrackerConfig, Tracklet, TrackletPolicy, TrackletStatus,
};
pub use error::{ImageError, TrackError};
pub use histogram::{RgbFeature, SpatialRgbHistogram};
pub use object::Detection;
pub use pixel_buffer::{ChromaMode, PixelBuffer, PixelFormat};
pub use rect::Rect;
