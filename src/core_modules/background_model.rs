// THEORY:
// The `background_model` module is the temporal memory of the counter. It learns,
// per pixel, what the empty road usually looks like and reports which pixels of a
// new frame do not fit that picture.
//
// Key architectural principles:
// 1.  **Per-Pixel Statistics**: Every pixel keeps a running mean and variance of
//     its intensity. A pixel is foreground when its squared deviation from the mean
//     exceeds `variance_threshold` times its learned variance (a Mahalanobis test
//     on a single Gaussian).
// 2.  **Adaptive Learning Rate**: The rate starts at `1 / frames_seen` so the first
//     frames converge quickly, then settles at `1 / history`, which bounds how long
//     the model remembers.
// 3.  **Selective Update**: Pixels classified as foreground learn at a fraction of
//     the normal rate. A vehicle driving through does not get absorbed into the
//     background within a couple of frames, while a parked one eventually does.
// 4.  **Clamped Variance**: Variance is held within `[min_variance, max_variance]`
//     so a perfectly static pixel never becomes infinitely sensitive and a noisy
//     one never becomes blind.
// 5.  **Warm-Up**: The first frame only seeds the model and yields an empty mask.
//     Masks in the frames that follow are less reliable; that is accepted.

use crate::core_modules::frame::{BACKGROUND, FOREGROUND, MotionMask};
use crate::error::{Error, Result};
use image::GrayImage;
use serde::Deserialize;

/// Tunables for the adaptive background model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackgroundModelConfig {
    /// Number of frames after which the learning rate stops decreasing.
    pub history: u32,
    /// Squared-deviation multiple of the variance beyond which a pixel is foreground.
    pub variance_threshold: f32,
    /// Variance assigned to every pixel when the model is seeded.
    pub initial_variance: f32,
    pub min_variance: f32,
    pub max_variance: f32,
    /// Fraction of the learning rate applied to pixels classified as foreground.
    pub foreground_learning_factor: f32,
}

impl Default for BackgroundModelConfig {
    fn default() -> Self {
        Self {
            history: 500,
            variance_threshold: 16.0,
            initial_variance: 15.0,
            min_variance: 4.0,
            max_variance: 75.0,
            foreground_learning_factor: 0.05,
        }
    }
}

impl BackgroundModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history == 0 {
            return Err(Error::InvalidConfig("background history must be at least 1 frame".into()));
        }
        if !(self.variance_threshold > 0.0) {
            return Err(Error::InvalidConfig("background variance threshold must be positive".into()));
        }
        if !(self.min_variance > 0.0) || self.min_variance > self.max_variance {
            return Err(Error::InvalidConfig(format!(
                "background variance bounds [{}, {}] are invalid",
                self.min_variance, self.max_variance
            )));
        }
        if !(self.initial_variance > 0.0) {
            return Err(Error::InvalidConfig("background initial variance must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.foreground_learning_factor) {
            return Err(Error::InvalidConfig(
                "foreground learning factor must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// A stateful classifier turning a smoothed grayscale frame into a motion mask.
pub trait BackgroundModel {
    /// Classifies every pixel of `frame` and folds the frame into the model.
    fn apply(&mut self, frame: &GrayImage) -> Result<MotionMask>;

    /// Number of frames the model has absorbed so far.
    fn frames_seen(&self) -> u64;
}

/// A single running Gaussian per pixel with selective, rate-limited updates.
pub struct AdaptiveGaussianModel {
    config: BackgroundModelConfig,
    width: u32,
    height: u32,
    means: Vec<f32>,
    variances: Vec<f32>,
    frames_seen: u64,
}

impl AdaptiveGaussianModel {
    /// Validates the parameters. The pixel buffers are sized by the first frame.
    pub fn new(config: BackgroundModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            width: 0,
            height: 0,
            means: Vec::new(),
            variances: Vec::new(),
            frames_seen: 0,
        })
    }

    fn seed(&mut self, frame: &GrayImage) -> MotionMask {
        self.width = frame.width();
        self.height = frame.height();
        self.means = frame.as_raw().iter().map(|&v| v as f32).collect();
        self.variances = vec![self.config.initial_variance; self.means.len()];
        self.frames_seen = 1;
        MotionMask::empty(self.width, self.height)
    }

    fn learning_rate(&self) -> f32 {
        let warmup = 1.0 / self.frames_seen as f32;
        let steady = 1.0 / self.config.history as f32;
        warmup.max(steady)
    }

    /// Learned mean intensity at a pixel, if the model has been seeded.
    pub fn mean_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.means.get((y * self.width + x) as usize).copied()
    }
}

impl BackgroundModel for AdaptiveGaussianModel {
    fn apply(&mut self, frame: &GrayImage) -> Result<MotionMask> {
        if self.frames_seen == 0 {
            return Ok(self.seed(frame));
        }
        if frame.width() != self.width || frame.height() != self.height {
            return Err(Error::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }

        self.frames_seen += 1;
        let rate = self.learning_rate();
        let foreground_rate = rate * self.config.foreground_learning_factor;
        let threshold = self.config.variance_threshold;
        let (min_var, max_var) = (self.config.min_variance, self.config.max_variance);

        let mut mask = Vec::with_capacity(self.means.len());
        for ((&value, mean), variance) in frame
            .as_raw()
            .iter()
            .zip(self.means.iter_mut())
            .zip(self.variances.iter_mut())
        {
            let delta = value as f32 - *mean;
            let dist_sq = delta * delta;
            let is_foreground = dist_sq > threshold * *variance;

            let alpha = if is_foreground { foreground_rate } else { rate };
            *mean += alpha * delta;
            *variance = (*variance + alpha * (dist_sq - *variance)).clamp(min_var, max_var);

            mask.push(if is_foreground { FOREGROUND } else { BACKGROUND });
        }

        let image = GrayImage::from_raw(self.width, self.height, mask).ok_or_else(|| {
            Error::InvalidConfig("mask buffer does not match model dimensions".into())
        })?;
        Ok(MotionMask::from_image(image))
    }

    fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}
