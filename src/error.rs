use thiserror::Error;

use crate::pixel_buffer::PixelFormat;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("crop window is out of image bounds: {0}")]
    OutOfBounds(String),
    #[error("failed to allocate {0} bytes")]
    AllocationFailed(usize),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid cost matrix: {0}")]
    InvalidCost(String),
    #[error("frame format {actual:?} does not match configured {expected:?}")]
    FormatMismatch {
        expected: PixelFormat,
        actual: PixelFormat,
    },
    #[error(transparent)]
    Image(#[from] ImageError),
}
