use nalgebra::SMatrix;

use crate::rect::Rect;

/* -----------------------------------------------------------------------------
 * Type aliases
 * ----------------------------------------------------------------------------- */
// 1x4, [cx, cy, w, h]
pub(crate) type DetectBox = SMatrix<f32, 1, 4>;
// 1x8, [cx, cy, w, h, vx, vy, vw, vh]
pub(crate) type StateMean = SMatrix<f32, 1, 8>;
// 8x8
pub(crate) type StateCov = SMatrix<f32, 8, 8>;
// 1x4
pub(crate) type StateHMean = SMatrix<f32, 1, 4>;
// 4x4
pub(crate) type StateHCov = SMatrix<f32, 4, 4>;

/// Frame interval the noise magnitudes are tuned for (30 fps).
const REFERENCE_DELTA_T: f32 = 0.033;

/* -----------------------------------------------------------------------------
 * Motion filter seam
 * ----------------------------------------------------------------------------- */
/// Box-level motion model of a single tracklet.
pub trait MotionFilter: Send {
    /// Advance the state by `delta_t` seconds and return the predicted box.
    fn predict(&mut self, delta_t: f32) -> Rect<f32>;

    /// Fold in a measured box and return the filtered box.
    fn correct(&mut self, measurement: &Rect<f32>) -> Rect<f32>;
}

/// Creates a fresh motion filter seeded from a box. Used at tracklet birth
/// and when a lost tracklet is re-acquired.
pub trait MotionFilterFactory: Send {
    fn create(&self, initial: &Rect<f32>) -> Box<dyn MotionFilter>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanFilterFactory {
    pub std_weight_position: f32,
    pub std_weight_velocity: f32,
}

impl Default for KalmanFilterFactory {
    fn default() -> Self {
        Self {
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }
}

impl MotionFilterFactory for KalmanFilterFactory {
    fn create(&self, initial: &Rect<f32>) -> Box<dyn MotionFilter> {
        let noise = SizeScaledNoise {
            std_weight_position: self.std_weight_position,
            std_weight_velocity: self.std_weight_velocity,
        };
        Box::new(KalmanFilter::with_policy(
            &to_measurement(initial),
            Box::new(noise),
        ))
    }
}

/* -----------------------------------------------------------------------------
 * Covariance policy
 * ----------------------------------------------------------------------------- */
pub(crate) trait CovariancePolicy: Send {
    fn init_state_cov(&self, z: &DetectBox) -> StateCov;
    fn r(&self, x: &StateMean) -> StateHCov;
    fn q(&self, x: &StateMean, delta_t: f32) -> StateCov;
}

/// Noise proportional to the current box size. Velocities are in pixels per
/// second, so their deviations are expressed relative to a 30 fps step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SizeScaledNoise {
    std_weight_position: f32,
    std_weight_velocity: f32,
}

impl Default for SizeScaledNoise {
    fn default() -> Self {
        let factory = KalmanFilterFactory::default();
        Self {
            std_weight_position: factory.std_weight_position,
            std_weight_velocity: factory.std_weight_velocity,
        }
    }
}

impl SizeScaledNoise {
    fn diag(values: [f32; 8]) -> StateCov {
        let mut p = StateCov::zeros();
        for (i, v) in values.iter().enumerate() {
            p[(i, i)] = v * v;
        }
        p
    }
}

impl CovariancePolicy for SizeScaledNoise {
    fn init_state_cov(&self, z: &DetectBox) -> StateCov {
        let (w, h) = (z[(0, 2)].max(1.0), z[(0, 3)].max(1.0));
        let pos = 2.0 * self.std_weight_position;
        let vel = 10.0 * self.std_weight_velocity / REFERENCE_DELTA_T;
        Self::diag([
            pos * w,
            pos * h,
            pos * w,
            pos * h,
            vel * w,
            vel * h,
            vel * w,
            vel * h,
        ])
    }

    fn r(&self, x: &StateMean) -> StateHCov {
        let (w, h) = (x[(0, 2)].max(1.0), x[(0, 3)].max(1.0));
        let std = [w, h, w, h].map(|v| self.std_weight_position * v);
        StateHCov::from_diagonal(
            &SMatrix::<f32, 1, 4>::from_iterator(std.map(|s| s * s)).transpose(),
        )
    }

    fn q(&self, x: &StateMean, delta_t: f32) -> StateCov {
        let (w, h) = (x[(0, 2)].max(1.0), x[(0, 3)].max(1.0));
        let steps = delta_t / REFERENCE_DELTA_T;
        let pos = self.std_weight_position * steps;
        let vel = self.std_weight_velocity * steps / REFERENCE_DELTA_T;
        Self::diag([
            pos * w,
            pos * h,
            pos * w,
            pos * h,
            vel * w,
            vel * h,
            vel * w,
            vel * h,
        ])
    }
}

/* -----------------------------------------------------------------------------
 * Kalman Filter
 * ----------------------------------------------------------------------------- */
/// Constant velocity Kalman filter over box centre and size.
pub struct KalmanFilter {
    update_mat: SMatrix<f32, 4, 8>,
    x: StateMean,
    covariance: StateCov,
    cov_policy: Box<dyn CovariancePolicy>,
}

pub(crate) fn to_measurement(rect: &Rect<f32>) -> DetectBox {
    rect.get_cxcywh()
}

fn to_rect(x: &StateMean) -> Rect<f32> {
    Rect::from_cxcywh(x[(0, 0)], x[(0, 1)], x[(0, 2)].max(0.0), x[(0, 3)].max(0.0))
}

impl KalmanFilter {
    pub fn new(initial: &Rect<f32>) -> Self {
        Self::with_policy(&to_measurement(initial), Box::new(SizeScaledNoise::default()))
    }

    pub(crate) fn with_policy(
        z: &DetectBox,
        cov_policy: Box<dyn CovariancePolicy>,
    ) -> Self {
        let mut update_mat = SMatrix::<f32, 4, 8>::zeros();
        for i in 0..4 {
            update_mat[(i, i)] = 1.0;
        }

        let mut x = StateMean::zeros();
        x.as_mut_slice()[0..4].copy_from_slice(z.as_slice());

        let covariance = cov_policy.init_state_cov(z);

        Self {
            update_mat,
            x,
            covariance,
            cov_policy,
        }
    }

    fn motion_mat(delta_t: f32) -> StateCov {
        let mut motion_mat = StateCov::identity();
        for i in 0..4 {
            motion_mat[(i, i + 4)] = delta_t;
        }
        motion_mat
    }

    pub(crate) fn predict_state(&mut self, delta_t: f32) -> (StateMean, StateCov) {
        let motion_mat = Self::motion_mat(delta_t);
        let motion_cov = self.cov_policy.q(&self.x, delta_t);
        self.x = (motion_mat * self.x.transpose()).transpose();
        self.covariance =
            motion_mat * self.covariance * motion_mat.transpose() + motion_cov;

        (self.x, self.covariance)
    }

    pub(crate) fn project(&self) -> (StateHMean, StateHCov) {
        let innovation_cov = self.cov_policy.r(&self.x);
        let mean = self.x * self.update_mat.transpose();
        let covariance =
            self.update_mat * self.covariance * self.update_mat.transpose();

        (mean, covariance + innovation_cov)
    }

    pub(crate) fn update(&mut self, measurement: &DetectBox) -> (StateMean, StateCov) {
        let (projected_mean, projected_covariance) = self.project();
        let innovation_cov = self.cov_policy.r(&self.x);

        let b = (self.covariance * self.update_mat.transpose()).transpose();
        let cholesky_factor = match projected_covariance.cholesky() {
            Some(factor) => factor,
            None => {
                log::warn!(
                    "innovation covariance is not positive definite; keeping prediction"
                );
                return (self.x, self.covariance);
            }
        };
        let kalman_gain = cholesky_factor.solve(&b);
        let innovation = measurement - projected_mean;
        self.x += innovation * kalman_gain;
        // Joseph form keeps the covariance symmetric in f32.
        let k = kalman_gain.transpose(); // 8x4
        let i_minus_kh = StateCov::identity() - k * self.update_mat;
        self.covariance = i_minus_kh * self.covariance * i_minus_kh.transpose()
            + k * innovation_cov * k.transpose();

        (self.x, self.covariance)
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &StateMean {
        &self.x
    }

    #[cfg(test)]
    pub(crate) fn covariance(&self) -> &StateCov {
        &self.covariance
    }
}

impl MotionFilter for KalmanFilter {
    fn predict(&mut self, delta_t: f32) -> Rect<f32> {
        let (x, _) = self.predict_state(delta_t);
        to_rect(&x)
    }

    fn correct(&mut self, measurement: &Rect<f32>) -> Rect<f32> {
        let (x, _) = self.update(&to_measurement(measurement));
        to_rect(&x)
    }
}
