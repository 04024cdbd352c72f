//! Detection to tracklet association.
//!
//! Costs combine a normalized centre distance, a normalized shape distance
//! and, when descriptors are available, a color histogram distance. Each
//! term is divided by a scale; the centre and shape scales grow with the
//! time since a tracklet was last matched, so long-unmatched tracklets
//! accept larger jumps.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::tracklet::Tracklet;
use crate::error::TrackError;
use crate::histogram::{RgbFeature, SpatialRgbHistogram};
use crate::hungarian;
use crate::object::Detection;
use crate::rect::Rect;

/// Cost of pairs that may never be associated.
pub const LARGE_COST: f32 = 1000.0;

const REFERENCE_DELTA_T: f32 = 0.033;
const CONSTANT_SCALE_RATIO: f32 = 0.95;

/* -----------------------------------------------------------------------------
 * Scales
 * ----------------------------------------------------------------------------- */
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationScales {
    pub rgb_hist_dist: f32,
    pub norm_center_dist: f32,
    pub norm_shape_dist: f32,
}

impl Default for AssociationScales {
    fn default() -> Self {
        Self {
            rgb_hist_dist: 0.25,
            norm_center_dist: 0.5,
            norm_shape_dist: 0.75,
        }
    }
}

#[inline(always)]
fn adaptive_scale(base: f32, delta_t: f32) -> f32 {
    CONSTANT_SCALE_RATIO * base
        + (1.0 - CONSTANT_SCALE_RATIO) * base * delta_t / REFERENCE_DELTA_T
}

impl AssociationScales {
    pub fn center_scale(&self, delta_t: f32) -> f32 {
        adaptive_scale(self.norm_center_dist, delta_t)
    }

    pub fn shape_scale(&self, delta_t: f32) -> f32 {
        adaptive_scale(self.norm_shape_dist, delta_t)
    }
}

/* -----------------------------------------------------------------------------
 * Distances
 * ----------------------------------------------------------------------------- */
/// Centre distance divided by the smaller half-perimeter of the two boxes.
pub fn normalized_center_distance(r1: &Rect<f32>, r2: &Rect<f32>) -> f32 {
    let normalizer =
        (0.5 * (r1.width() + r1.height())).min(0.5 * (r2.width() + r2.height()));
    if normalizer <= 0.0 {
        return LARGE_COST;
    }
    let (x1, y1) = r1.center();
    let (x2, y2) = r2.center();
    let dx = (x2 - x1) / normalizer;
    let dy = (y2 - y1) / normalizer;
    (dx * dx + dy * dy).sqrt()
}

/// Width and height differences relative to the box with the smaller
/// perimeter.
pub fn normalized_shape_distance(r1: &Rect<f32>, r2: &Rect<f32>) -> f32 {
    let (norm_w, norm_h) = if r2.width() + r2.height() < r1.width() + r1.height() {
        (r2.width(), r2.height())
    } else {
        (r1.width(), r1.height())
    };
    if norm_w <= 0.0 || norm_h <= 0.0 {
        return LARGE_COST;
    }
    let dw = (r2.width() - r1.width()) / norm_w;
    let dh = (r2.height() - r1.height()) / norm_h;
    (dw * dw + dh * dh).sqrt()
}

/// `1 - similarity` against the closest descriptor in the history.
pub fn rgb_distance(feature: &RgbFeature, history: &[&RgbFeature]) -> f32 {
    history
        .iter()
        .map(|h| 1.0 - SpatialRgbHistogram::compute_similarity(feature, h))
        .fold(LARGE_COST, f32::min)
}

/* -----------------------------------------------------------------------------
 * Associator
 * ----------------------------------------------------------------------------- */
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationResult {
    pub detection_is_associated: Vec<bool>,
    /// Detection position matched to each tracklet.
    pub tracklet_detection_index: Vec<Option<usize>>,
}

impl AssociationResult {
    fn unmatched(n_detections: usize, n_tracklets: usize) -> Self {
        Self {
            detection_is_associated: vec![false; n_detections],
            tracklet_detection_index: vec![None; n_tracklets],
        }
    }

    pub fn num_matched(&self) -> usize {
        self.tracklet_detection_index
            .iter()
            .filter(|d| d.is_some())
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct ObjectsAssociator {
    tracking_per_class: bool,
    scales: AssociationScales,
    cost_threshold: f32,
}

impl ObjectsAssociator {
    pub fn new(
        tracking_per_class: bool,
        scales: AssociationScales,
        cost_threshold: f32,
    ) -> Self {
        Self {
            tracking_per_class,
            scales,
            cost_threshold,
        }
    }

    fn gated(&self, detection: &Detection, tracklet: &Tracklet) -> bool {
        self.tracking_per_class && detection.class_label != tracklet.label()
    }

    /// Cost table of shape `n_det x (n_trk + n_det)`. The right block holds
    /// the cost of starting a new tracklet: `cost_threshold` on the diagonal
    /// and `cost_threshold + 1` elsewhere.
    pub fn cost_matrix(
        &self,
        detections: &[Detection],
        tracklets: &[Tracklet],
        detection_features: Option<&[RgbFeature]>,
    ) -> DMatrix<f32> {
        let n_det = detections.len();
        let n_trk = tracklets.len();
        debug_assert!(
            detection_features.map_or(true, |f| f.len() == n_det),
            "one descriptor per detection expected"
        );

        let mut cost =
            DMatrix::from_element(n_det, n_trk + n_det, self.cost_threshold + 1.0);
        for d in 0..n_det {
            cost[(d, n_trk + d)] = self.cost_threshold;
        }

        for (t, tracklet) in tracklets.iter().enumerate() {
            let center_scale = self.scales.center_scale(tracklet.association_delta_t());
            let shape_scale = self.scales.shape_scale(tracklet.association_delta_t());
            let rgb_scale = self.scales.rgb_hist_dist;
            let log_term = (rgb_scale * center_scale * shape_scale).ln();
            let history = tracklet.rgb_features().iter().collect::<Vec<_>>();

            for (d, detection) in detections.iter().enumerate() {
                if self.gated(detection, tracklet) {
                    cost[(d, t)] = LARGE_COST;
                    continue;
                }
                let (center_dist, shape_dist) = match tracklet.rect() {
                    Some(r) => (
                        normalized_center_distance(&detection.rect, r),
                        normalized_shape_distance(&detection.rect, r),
                    ),
                    None => (LARGE_COST, LARGE_COST),
                };
                let mut c = log_term + center_dist / center_scale + shape_dist / shape_scale;
                if let Some(features) = detection_features {
                    c += rgb_distance(&features[d], &history) / rgb_scale;
                }
                cost[(d, t)] = c;
            }
        }
        cost
    }

    pub fn associate(
        &self,
        detections: &[Detection],
        tracklets: &[Tracklet],
        detection_features: Option<&[RgbFeature]>,
    ) -> Result<AssociationResult, TrackError> {
        let n_det = detections.len();
        let n_trk = tracklets.len();
        let mut result = AssociationResult::unmatched(n_det, n_trk);
        if n_det == 0 {
            return Ok(result);
        }

        let cost = self.cost_matrix(detections, tracklets, detection_features);
        if log::log_enabled!(log::Level::Trace) {
            for d in 0..n_det {
                for t in 0..n_trk {
                    log::trace!(
                        "cost det {} -> tracklet {}: {:.4}",
                        d,
                        tracklets[t].id(),
                        cost[(d, t)]
                    );
                }
            }
        }

        let assignment = hungarian::solve(&cost)?;
        for d in 0..n_det {
            if let Some(t) = (0..n_trk).find(|&t| assignment[(d, t)]) {
                result.detection_is_associated[d] = true;
                result.tracklet_detection_index[t] = Some(d);
            }
        }
        Ok(result)
    }
}
