//! Per-frame tracker combining motion prediction, color histogram appearance
//! and Hungarian association.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::assoc::{AssociationScales, ObjectsAssociator};
use super::kalman_filter::{KalmanFilterFactory, MotionFilterFactory};
use super::tracklet::{Tracklet, TrackletPolicy};
use crate::appearance::{extractor_for, AppearanceExtractor};
use crate::error::TrackError;
use crate::histogram::RgbFeature;
use crate::object::Detection;
use crate::occlusion::{MaxOverlapOcclusion, OcclusionEstimator};
use crate::pixel_buffer::{PixelBuffer, PixelFormat};
use crate::rect::Rect;

const MIN_DELTA_T: f32 = 0.005;
const MAX_DELTA_T: f32 = 0.5;

/* -----------------------------------------------------------------------------
 * TrackerConfig
 * ----------------------------------------------------------------------------- */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Upper bound on simultaneously tracked objects; `None` is unbounded.
    /// Tracklets that die in the current frame still occupy their slot
    /// until the frame ends.
    pub max_num_objects: Option<usize>,
    /// Minimum share of a box that must stay inside the frame.
    pub min_region_ratio_in_boundary: f32,
    pub input_color_format: PixelFormat,
    /// Forbid associating detections with tracklets of another class.
    pub tracking_per_class: bool,
    pub association_scales: AssociationScales,
    /// Cost of starting a new tracklet instead of extending an existing one.
    pub association_cost_threshold: f32,
    pub policy: TrackletPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_num_objects: None,
            min_region_ratio_in_boundary: 0.1,
            input_color_format: PixelFormat::Bgr24,
            tracking_per_class: true,
            association_scales: AssociationScales::default(),
            association_cost_threshold: 1.0,
            policy: TrackletPolicy::default(),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), TrackError> {
        let invalid = |msg: String| Err(TrackError::InvalidArgument(msg));
        if self.max_num_objects == Some(0) {
            return invalid("max_num_objects must be positive or None".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_region_ratio_in_boundary) {
            return invalid(format!(
                "min_region_ratio_in_boundary {} is outside [0, 1]",
                self.min_region_ratio_in_boundary
            ));
        }
        if self.input_color_format == PixelFormat::Unknown {
            return invalid("input_color_format must be a concrete format".to_string());
        }
        if !self.association_cost_threshold.is_finite() {
            return invalid(format!(
                "association_cost_threshold {} is not finite",
                self.association_cost_threshold
            ));
        }
        let scales = &self.association_scales;
        for (name, v) in [
            ("rgb_hist_dist", scales.rgb_hist_dist),
            ("norm_center_dist", scales.norm_center_dist),
            ("norm_shape_dist", scales.norm_shape_dist),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return invalid(format!("association scale {} = {} must be positive", name, v));
            }
        }
        if self.policy.max_trajectory_size == 0 || self.policy.max_rgb_feature_history == 0 {
            return invalid("trajectory and feature histories must hold at least one entry".to_string());
        }
        Ok(())
    }
}

/* -----------------------------------------------------------------------------
 * ChistTracker
 * ----------------------------------------------------------------------------- */
pub struct ChistTracker {
    config: TrackerConfig,
    associator: ObjectsAssociator,
    motion_filter_factory: Box<dyn MotionFilterFactory>,
    occlusion_estimator: Box<dyn OcclusionEstimator>,
    appearance_extractor: Option<Box<dyn AppearanceExtractor>>,

    frame_count: u64,
    next_id: u64,
    tracklets: Vec<Tracklet>,
}

impl fmt::Debug for ChistTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChistTracker")
            .field("config", &self.config)
            .field("frame_count", &self.frame_count)
            .field("next_id", &self.next_id)
            .field("tracklets", &self.tracklets)
            .finish()
    }
}

/// Share of `rect` lying inside `boundary`; empty boxes count as outside.
fn ratio_in_boundary(rect: &Rect<f32>, boundary: &Rect<f32>) -> f32 {
    let area = rect.area();
    if area <= 0.0 {
        return 0.0;
    }
    rect.intersect(boundary).area() / area
}

/// A box entirely outside the frame never survives, whatever the ratio.
fn is_in_boundary(rect: &Rect<f32>, boundary: &Rect<f32>, min_ratio: f32) -> bool {
    let ratio = ratio_in_boundary(rect, boundary);
    ratio > 0.0 && ratio >= min_ratio
}

impl ChistTracker {
    /// # Example
    /// ```
    /// use chisttrack_rs::{ChistTracker, TrackerConfig};
    /// let tracker = ChistTracker::new(TrackerConfig::default()).unwrap();
    /// assert_eq!(tracker.frame_count(), 0);
    /// ```
    pub fn new(config: TrackerConfig) -> Result<Self, TrackError> {
        config.validate()?;
        let associator = ObjectsAssociator::new(
            config.tracking_per_class,
            config.association_scales,
            config.association_cost_threshold,
        );
        log::debug!("created tracker: {:?}", config);
        Ok(Self {
            appearance_extractor: extractor_for(config.input_color_format),
            config,
            associator,
            motion_filter_factory: Box::new(KalmanFilterFactory::default()),
            occlusion_estimator: Box::new(MaxOverlapOcclusion),
            frame_count: 0,
            next_id: 1,
            tracklets: Vec::new(),
        })
    }

    pub fn with_motion_filter_factory(
        self,
        motion_filter_factory: Box<dyn MotionFilterFactory>,
    ) -> Self {
        Self {
            motion_filter_factory,
            ..self
        }
    }

    pub fn with_occlusion_estimator(
        self,
        occlusion_estimator: Box<dyn OcclusionEstimator>,
    ) -> Self {
        Self {
            occlusion_estimator,
            ..self
        }
    }

    /// Replace the appearance extractor. `None` tracks on position and
    /// shape alone.
    pub fn with_appearance_extractor(
        self,
        appearance_extractor: Option<Box<dyn AppearanceExtractor>>,
    ) -> Self {
        Self {
            appearance_extractor,
            ..self
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn tracklets(&self) -> &[Tracklet] {
        &self.tracklets
    }

    pub fn tracklet(&self, id: u64) -> Option<&Tracklet> {
        self.tracklets.iter().find(|t| t.id() == id)
    }

    /// Drop a tracklet by id. Returns whether it existed.
    pub fn remove_object(&mut self, id: u64) -> bool {
        match self.tracklets.iter().position(|t| t.id() == id) {
            Some(pos) => {
                self.tracklets.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Forget every tracklet and restart the frame counter. Ids keep
    /// increasing.
    pub fn reset(&mut self) {
        self.tracklets.clear();
        self.frame_count = 0;
    }

    /// Process one frame. `delta_t` is the time in seconds since the
    /// previous frame.
    pub fn track_objects(
        &mut self,
        frame: &PixelBuffer,
        detections: &[Detection],
        delta_t: f32,
    ) -> Result<&[Tracklet], TrackError> {
        if !(MIN_DELTA_T..=MAX_DELTA_T).contains(&delta_t) {
            return Err(TrackError::InvalidArgument(format!(
                "delta_t {} is outside [{}, {}]",
                delta_t, MIN_DELTA_T, MAX_DELTA_T
            )));
        }
        if frame.format() != self.config.input_color_format {
            return Err(TrackError::FormatMismatch {
                expected: self.config.input_color_format,
                actual: frame.format(),
            });
        }
        if let Some(d) = detections.iter().find(|d| {
            let [x, y, w, h] = [d.rect.x(), d.rect.y(), d.rect.width(), d.rect.height()];
            !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite())
        }) {
            return Err(TrackError::InvalidArgument(format!(
                "detection {} has a non-finite box {:?}",
                d.index, d.rect
            )));
        }
        let boundary = frame.bounds();
        let features = self.extract_features(frame, detections, &boundary)?;

        for tracklet in self.tracklets.iter_mut() {
            tracklet.predict(delta_t);
        }

        let association =
            self.associator
                .associate(detections, &self.tracklets, features.as_deref())?;

        let policy = self.config.policy;
        for (tracklet, matched) in self
            .tracklets
            .iter_mut()
            .zip(association.tracklet_detection_index.iter())
        {
            match matched {
                Some(d) => tracklet.on_associated(
                    &detections[*d],
                    self.motion_filter_factory.as_ref(),
                    &policy,
                ),
                None => tracklet.on_missed(&policy),
            }
        }

        let ratios = self.occlusion_estimator.estimate(&self.tracklets);
        for (tracklet, ratio) in self.tracklets.iter_mut().zip(ratios) {
            if let Some(ratio) = ratio {
                tracklet.set_occlusion_ratio(ratio);
            }
        }

        if let Some(features) = &features {
            for (tracklet, matched) in self
                .tracklets
                .iter_mut()
                .zip(association.tracklet_detection_index.iter())
            {
                if let Some(d) = matched {
                    tracklet.update_appearance(&features[*d], &policy);
                }
            }
        }

        let spawned = self.spawn_tracklets(
            detections,
            &association.detection_is_associated,
            features,
        );

        let before = self.tracklets.len();
        self.tracklets.retain(|t| !t.is_dead());
        let min_ratio = self.config.min_region_ratio_in_boundary;
        self.tracklets.retain(|t| {
            t.rect()
                .map_or(false, |r| is_in_boundary(r, &boundary, min_ratio))
        });
        let removed = before - self.tracklets.len();

        for tracklet in self.tracklets.iter_mut() {
            tracklet.trim(&policy);
        }

        log::debug!(
            "frame {}: {} detections, {} matched, {} spawned, {} removed, {} tracklets",
            self.frame_count,
            detections.len(),
            association.num_matched(),
            spawned,
            removed,
            self.tracklets.len()
        );
        self.frame_count += 1;
        Ok(&self.tracklets)
    }

    fn extract_features(
        &self,
        frame: &PixelBuffer,
        detections: &[Detection],
        boundary: &Rect<f32>,
    ) -> Result<Option<Vec<RgbFeature>>, TrackError> {
        let extractor = match &self.appearance_extractor {
            Some(extractor) if !detections.is_empty() => extractor,
            _ => return Ok(None),
        };
        let features = detections
            .iter()
            .map(|d| extractor.extract(frame, &d.rect.intersect(boundary)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(features))
    }

    fn spawn_tracklets(
        &mut self,
        detections: &[Detection],
        detection_is_associated: &[bool],
        features: Option<Vec<RgbFeature>>,
    ) -> usize {
        let mut features = features.map(|f| f.into_iter().map(Some).collect::<Vec<_>>());
        // dead tracklets are only dropped after spawning
        let mut count = self.tracklets.len();
        let mut spawned = 0;
        for (d, detection) in detections.iter().enumerate() {
            if detection_is_associated[d] {
                continue;
            }
            if let Some(max) = self.config.max_num_objects {
                if count >= max {
                    log::debug!(
                        "dropping detection {}: {} objects already tracked",
                        detection.index,
                        count
                    );
                    continue;
                }
            }
            let filter = self.motion_filter_factory.create(&detection.rect);
            let mut tracklet = Tracklet::new(self.next_id, detection, filter);
            self.next_id += 1;
            if let Some(feature) = features.as_mut().and_then(|f| f[d].take()) {
                tracklet.push_feature(feature);
            }
            self.tracklets.push(tracklet);
            count += 1;
            spawned += 1;
        }
        spawned
    }
}
