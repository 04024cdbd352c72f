//! Per-object tracking state and its lifecycle transitions.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::kalman_filter::{MotionFilter, MotionFilterFactory};
use crate::histogram::RgbFeature;
use crate::object::Detection;
use crate::rect::Rect;

/* -----------------------------------------------------------------------------
 * TrackletStatus
 * ----------------------------------------------------------------------------- */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackletStatus {
    /// Spawned recently; not yet confirmed by enough consecutive matches.
    New,
    Tracked,
    /// Confirmed before, currently unmatched.
    Lost,
    /// Terminal. Removed within the frame it is reached.
    Dead,
}

/* -----------------------------------------------------------------------------
 * TrackletPolicy
 * ----------------------------------------------------------------------------- */
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackletPolicy {
    /// Consecutive matches (spawn included) that confirm a new tracklet.
    pub min_birth_count: u32,
    /// Misses a lost tracklet survives before it dies.
    pub max_association_fail_count: u32,
    pub max_trajectory_size: usize,
    pub max_rgb_feature_history: usize,
    /// Tracked tracklets occluded at or above this ratio keep their
    /// appearance model frozen.
    pub max_occlusion_ratio_for_model_update: f32,
}

impl Default for TrackletPolicy {
    fn default() -> Self {
        Self {
            min_birth_count: 3,
            max_association_fail_count: 120,
            max_trajectory_size: 30,
            max_rgb_feature_history: 1,
            max_occlusion_ratio_for_model_update: 0.4,
        }
    }
}

/* -----------------------------------------------------------------------------
 * Tracklet
 * ----------------------------------------------------------------------------- */
#[derive(Serialize)]
pub struct Tracklet {
    id: u64,
    status: TrackletStatus,
    label: i32,
    trajectory: VecDeque<Rect<f32>>,
    trajectory_filtered: VecDeque<Rect<f32>>,
    #[serde(skip)]
    rgb_features: VecDeque<RgbFeature>,
    #[serde(skip)]
    motion_filter: Box<dyn MotionFilter>,
    association_idx: Option<i32>,
    association_fail_count: u32,
    association_delta_t: f32,
    birth_count: u32,
    occlusion_ratio: f32,
}

impl fmt::Debug for Tracklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracklet")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("label", &self.label)
            .field("rect", &self.trajectory.back())
            .field("association_idx", &self.association_idx)
            .field("association_fail_count", &self.association_fail_count)
            .field("birth_count", &self.birth_count)
            .field("occlusion_ratio", &self.occlusion_ratio)
            .finish()
    }
}

impl Tracklet {
    pub(crate) fn new(
        id: u64,
        detection: &Detection,
        motion_filter: Box<dyn MotionFilter>,
    ) -> Self {
        let mut tracklet = Self {
            id,
            status: TrackletStatus::New,
            label: detection.class_label,
            trajectory: VecDeque::new(),
            trajectory_filtered: VecDeque::new(),
            rgb_features: VecDeque::new(),
            motion_filter,
            association_idx: Some(detection.index),
            association_fail_count: 0,
            association_delta_t: 0.0,
            birth_count: 1,
            occlusion_ratio: 0.0,
        };
        tracklet.renew_trajectory(&detection.rect);
        tracklet
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> TrackletStatus {
        self.status
    }

    pub fn label(&self) -> i32 {
        self.label
    }

    /// Latest box: the matched detection, or the prediction when unmatched.
    pub fn rect(&self) -> Option<&Rect<f32>> {
        self.trajectory.back()
    }

    pub fn filtered_rect(&self) -> Option<&Rect<f32>> {
        self.trajectory_filtered.back()
    }

    pub fn trajectory(&self) -> &VecDeque<Rect<f32>> {
        &self.trajectory
    }

    pub fn trajectory_filtered(&self) -> &VecDeque<Rect<f32>> {
        &self.trajectory_filtered
    }

    pub fn rgb_features(&self) -> &VecDeque<RgbFeature> {
        &self.rgb_features
    }

    /// `index` of the detection matched this frame.
    pub fn association_idx(&self) -> Option<i32> {
        self.association_idx
    }

    pub fn association_fail_count(&self) -> u32 {
        self.association_fail_count
    }

    /// Seconds since the last match.
    pub fn association_delta_t(&self) -> f32 {
        self.association_delta_t
    }

    pub fn birth_count(&self) -> u32 {
        self.birth_count
    }

    pub fn occlusion_ratio(&self) -> f32 {
        self.occlusion_ratio
    }

    pub fn is_dead(&self) -> bool {
        self.status == TrackletStatus::Dead
    }

    /* -------------------------------------------------------------------------
     * Per-frame updates, driven by the tracker
     * ------------------------------------------------------------------------- */
    pub(crate) fn predict(&mut self, delta_t: f32) {
        let predicted = self.motion_filter.predict(delta_t);
        self.trajectory.push_back(predicted);
        self.trajectory_filtered.push_back(predicted);
        self.association_delta_t += delta_t;
        self.association_idx = None;
    }

    pub(crate) fn on_associated(
        &mut self,
        detection: &Detection,
        filter_factory: &dyn MotionFilterFactory,
        policy: &TrackletPolicy,
    ) {
        self.association_delta_t = 0.0;
        self.association_fail_count = 0;
        self.association_idx = Some(detection.index);
        self.label = detection.class_label;

        match self.status {
            TrackletStatus::New => {
                self.replace_latest(&detection.rect);
                self.birth_count += 1;
                if self.birth_count >= policy.min_birth_count {
                    self.status = TrackletStatus::Tracked;
                }
            }
            TrackletStatus::Tracked => self.replace_latest(&detection.rect),
            TrackletStatus::Lost => {
                self.renew_trajectory(&detection.rect);
                self.motion_filter = filter_factory.create(&detection.rect);
                self.status = TrackletStatus::Tracked;
            }
            TrackletStatus::Dead => {}
        }
    }

    pub(crate) fn on_missed(&mut self, policy: &TrackletPolicy) {
        match self.status {
            // non-consecutive association is treated as a false alarm
            TrackletStatus::New => self.status = TrackletStatus::Dead,
            TrackletStatus::Tracked => {
                self.status = TrackletStatus::Lost;
                self.association_fail_count = 0;
            }
            TrackletStatus::Lost => {
                self.association_fail_count += 1;
                if self.association_fail_count >= policy.max_association_fail_count {
                    self.status = TrackletStatus::Dead;
                }
            }
            TrackletStatus::Dead => {}
        }
    }

    pub(crate) fn set_occlusion_ratio(&mut self, ratio: f32) {
        self.occlusion_ratio = ratio.clamp(0.0, 1.0);
    }

    /// Push the matched detection's descriptor unless a tracked tracklet is
    /// too occluded to trust it. Returns whether the model changed.
    pub(crate) fn update_appearance(
        &mut self,
        feature: &RgbFeature,
        policy: &TrackletPolicy,
    ) -> bool {
        let accept = match self.status {
            TrackletStatus::New | TrackletStatus::Lost => true,
            TrackletStatus::Tracked => {
                self.occlusion_ratio < policy.max_occlusion_ratio_for_model_update
            }
            TrackletStatus::Dead => false,
        };
        if accept {
            self.rgb_features.push_back(feature.clone());
        }
        accept
    }

    pub(crate) fn push_feature(&mut self, feature: RgbFeature) {
        self.rgb_features.push_back(feature);
    }

    pub(crate) fn trim(&mut self, policy: &TrackletPolicy) {
        while self.trajectory.len() > policy.max_trajectory_size {
            self.trajectory.pop_front();
        }
        while self.trajectory_filtered.len() > policy.max_trajectory_size {
            self.trajectory_filtered.pop_front();
        }
        while self.rgb_features.len() > policy.max_rgb_feature_history {
            self.rgb_features.pop_front();
        }
        debug_assert_eq!(
            self.trajectory.len(),
            self.trajectory_filtered.len(),
            "trajectories of tracklet {} diverged",
            self.id
        );
    }

    fn replace_latest(&mut self, rect: &Rect<f32>) {
        let filtered = self.motion_filter.correct(rect);
        match (self.trajectory.back_mut(), self.trajectory_filtered.back_mut()) {
            (Some(last), Some(last_filtered)) => {
                *last = *rect;
                *last_filtered = filtered;
            }
            _ => {
                self.trajectory.push_back(*rect);
                self.trajectory_filtered.push_back(filtered);
            }
        }
    }

    fn renew_trajectory(&mut self, rect: &Rect<f32>) {
        self.trajectory.clear();
        self.trajectory_filtered.clear();
        self.trajectory.push_back(*rect);
        self.trajectory_filtered.push_back(*rect);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    /// Motion filter that predicts the last corrected box.
    pub(crate) struct HoldFilter {
        rect: Rect<f32>,
    }

    impl MotionFilter for HoldFilter {
        fn predict(&mut self, _delta_t: f32) -> Rect<f32> {
            self.rect
        }

        fn correct(&mut self, measurement: &Rect<f32>) -> Rect<f32> {
            self.rect = *measurement;
            self.rect
        }
    }

    pub(crate) struct HoldFilterFactory;

    impl MotionFilterFactory for HoldFilterFactory {
        fn create(&self, initial: &Rect<f32>) -> Box<dyn MotionFilter> {
            Box::new(HoldFilter { rect: *initial })
        }
    }

    fn detection(x: f32, index: i32) -> Detection {
        Detection::new(Rect::new(x, 10.0, 50.0, 50.0), 0, index)
    }

    fn spawn(det: &Detection) -> Tracklet {
        Tracklet::new(1, det, HoldFilterFactory.create(&det.rect))
    }

    fn step(t: &mut Tracklet, det: Option<&Detection>, policy: &TrackletPolicy) {
        t.predict(0.033);
        match det {
            Some(d) => t.on_associated(d, &HoldFilterFactory, policy),
            None => t.on_missed(policy),
        }
        t.trim(policy);
    }

    #[test]
    fn test_spawn_counts_as_first_match() {
        let det = detection(10.0, 7);
        let t = spawn(&det);
        assert_eq!(t.status(), TrackletStatus::New);
        assert_eq!(t.birth_count(), 1);
        assert_eq!(t.association_idx(), Some(7));
        assert_eq!(t.trajectory().len(), 1);
        assert_eq!(t.trajectory_filtered().len(), 1);
    }

    #[test]
    fn test_three_matches_confirm() {
        let policy = TrackletPolicy::default();
        let det = detection(10.0, 0);
        let mut t = spawn(&det);
        step(&mut t, Some(&det), &policy);
        assert_eq!(t.status(), TrackletStatus::New);
        step(&mut t, Some(&det), &policy);
        assert_eq!(t.status(), TrackletStatus::Tracked);
        assert_eq!(t.trajectory().len(), 3);
    }

    #[test]
    fn test_new_miss_is_dead() {
        let policy = TrackletPolicy::default();
        let det = detection(10.0, 0);
        let mut t = spawn(&det);
        step(&mut t, Some(&det), &policy);
        step(&mut t, None, &policy);
        assert!(t.is_dead());
    }

    #[test]
    fn test_lost_lifecycle() {
        let policy = TrackletPolicy::default();
        let det = detection(10.0, 0);
        let mut t = spawn(&det);
        step(&mut t, Some(&det), &policy);
        step(&mut t, Some(&det), &policy);
        step(&mut t, None, &policy);
        assert_eq!(t.status(), TrackletStatus::Lost);
        assert_eq!(t.association_fail_count(), 0);
        assert_eq!(t.association_idx(), None);
        assert_nearly_eq!(t.association_delta_t(), 0.033, 1e-6);

        for _ in 0..119 {
            step(&mut t, None, &policy);
        }
        assert_eq!(t.status(), TrackletStatus::Lost);
        assert_eq!(t.association_fail_count(), 119);

        step(&mut t, None, &policy);
        assert!(t.is_dead());
    }

    #[test]
    fn test_lost_match_renews_trajectory() {
        let policy = TrackletPolicy::default();
        let det = detection(10.0, 0);
        let mut t = spawn(&det);
        for _ in 0..5 {
            step(&mut t, Some(&det), &policy);
        }
        step(&mut t, None, &policy);
        for _ in 0..119 {
            step(&mut t, None, &policy);
        }
        assert_eq!(t.association_fail_count(), 119);

        let moved = Detection::new(Rect::new(200.0, 10.0, 50.0, 50.0), 3, 9);
        step(&mut t, Some(&moved), &policy);
        assert_eq!(t.status(), TrackletStatus::Tracked);
        assert_eq!(t.association_fail_count(), 0);
        assert_eq!(t.association_delta_t(), 0.0);
        assert_eq!(t.association_idx(), Some(9));
        assert_eq!(t.label(), 3);
        assert_eq!(t.trajectory().len(), 1);
        assert_eq!(t.rect(), Some(&moved.rect));
    }

    #[test]
    fn test_trajectory_is_bounded() {
        let policy = TrackletPolicy::default();
        let det = detection(10.0, 0);
        let mut t = spawn(&det);
        for _ in 0..40 {
            step(&mut t, Some(&det), &policy);
        }
        assert_eq!(t.trajectory().len(), 30);
        assert_eq!(t.trajectory_filtered().len(), 30);
    }

    #[test]
    fn test_appearance_update_gate() {
        let policy = TrackletPolicy::default();
        let det = detection(10.0, 0);
        let feature = RgbFeature::from_element(4, 1.0);
        let mut t = spawn(&det);
        assert!(t.update_appearance(&feature, &policy));

        step(&mut t, Some(&det), &policy);
        step(&mut t, Some(&det), &policy);
        assert_eq!(t.status(), TrackletStatus::Tracked);
        t.set_occlusion_ratio(0.5);
        assert!(!t.update_appearance(&feature, &policy));
        t.set_occlusion_ratio(0.39);
        assert!(t.update_appearance(&feature, &policy));

        t.trim(&policy);
        assert_eq!(t.rgb_features().len(), 1);
    }
}
