use crate::chist_tracker::{Tracklet, TrackletStatus};

/// Estimates how much of each tracklet is hidden by the others. The result
/// gates appearance model updates.
pub trait OcclusionEstimator: Send {
    /// One entry per tracklet. `None` leaves the previous ratio untouched.
    fn estimate(&self, tracklets: &[Tracklet]) -> Vec<Option<f32>>;
}

/// For every tracked tracklet, the largest fraction of its latest box covered
/// by any single other non-lost tracklet. This is not IoU: the ratio is
/// relative to the occluded box only.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxOverlapOcclusion;

impl OcclusionEstimator for MaxOverlapOcclusion {
    fn estimate(&self, tracklets: &[Tracklet]) -> Vec<Option<f32>> {
        tracklets
            .iter()
            .enumerate()
            .map(|(t0, tracklet0)| {
                if tracklet0.status() != TrackletStatus::Tracked {
                    return None;
                }
                let r0 = tracklet0.rect()?;
                let area = r0.area();
                if area <= 0.0 {
                    return Some(0.0);
                }
                let ratio = tracklets
                    .iter()
                    .enumerate()
                    .filter(|(t1, t)| *t1 != t0 && t.status() != TrackletStatus::Lost)
                    .filter_map(|(_, t)| t.rect())
                    .map(|r1| r0.intersect(r1).area() / area)
                    .fold(0.0f32, f32::max);
                Some(ratio)
            })
            .collect()
    }
}
