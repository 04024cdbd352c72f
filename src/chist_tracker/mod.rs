pub mod assoc;
mod chist_tracker;
pub mod kalman_filter;
pub mod tracklet;

pub use assoc::{AssociationResult, AssociationScales, ObjectsAssociator};
pub use chist_tracker::{ChistTracker, TrackerConfig};
pub use kalman_filter::{
    KalmanFilter, KalmanFilterFactory, MotionFilter, MotionFilterFactory,
};
pub use tracklet::{Tracklet, TrackletPolicy, TrackletStatus};
