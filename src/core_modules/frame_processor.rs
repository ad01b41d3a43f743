// THEORY:
// The `FrameProcessor` is the first stage of the counting pipeline. It turns a raw
// colour frame into a clean binary motion mask that the blob detector can scan.
//
// Stages, in order:
// 1.  **Luma**: collapse the frame to one 8-bit intensity channel.
// 2.  **Smoothing**: a 3x3 mean filter suppresses single-pixel sensor noise before
//     the background model ever sees it.
// 3.  **Background Subtraction**: the adaptive model classifies each pixel and
//     learns from the frame at the same time. This is the only stateful stage.
// 4.  **Dilation**: a 5x5 square neighbourhood grows foreground so a vehicle that
//     was split by a thin band of background reconnects.
// 5.  **Closing (twice)**: two closing passes with a 5x5 diamond fill pinholes and
//     merge fragments without growing the outline further.

use crate::core_modules::background_model::{
    AdaptiveGaussianModel, BackgroundModel, BackgroundModelConfig,
};
use crate::core_modules::frame::{Frame, MotionMask};
use crate::error::Result;
use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::filter::box_filter;
use imageproc::morphology::{close, dilate};
use serde::Deserialize;

/// Neighbourhood sizes for the smoothing and morphology stages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MorphologyConfig {
    /// Radius of the mean filter. 1 gives a 3x3 kernel; 0 disables smoothing.
    pub blur_radius: u32,
    /// Chessboard radius of the dilation. 2 gives a 5x5 square.
    pub dilation_radius: u8,
    /// City-block radius of each closing. 2 gives a 5x5 diamond.
    pub closing_radius: u8,
    pub closing_passes: u32,
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self {
            blur_radius: 1,
            dilation_radius: 2,
            closing_radius: 2,
            closing_passes: 2,
        }
    }
}

/// Owns the background model and applies the full mask-building chain to each frame.
pub struct FrameProcessor {
    background: Box<dyn BackgroundModel + Send>,
    morphology: MorphologyConfig,
}

impl FrameProcessor {
    /// Builds a processor backed by the default adaptive Gaussian model.
    pub fn new(background: BackgroundModelConfig, morphology: MorphologyConfig) -> Result<Self> {
        let model = AdaptiveGaussianModel::new(background)?;
        Ok(Self::with_model(Box::new(model), morphology))
    }

    /// Builds a processor around any background model implementation.
    pub fn with_model(
        background: Box<dyn BackgroundModel + Send>,
        morphology: MorphologyConfig,
    ) -> Self {
        Self {
            background,
            morphology,
        }
    }

    pub fn process(&mut self, frame: &Frame) -> Result<MotionMask> {
        // --- 1. Luma ---
        let gray = frame.image().to_luma8();

        // --- 2. Smoothing ---
        let smoothed = self.smooth(gray);

        // --- 3. Background Subtraction ---
        let raw_mask = self.background.apply(&smoothed)?;

        // --- 4 & 5. Morphological Cleanup ---
        Ok(MotionMask::from_image(self.clean_up(raw_mask.into_image())))
    }

    pub fn frames_seen(&self) -> u64 {
        self.background.frames_seen()
    }

    fn smooth(&self, gray: GrayImage) -> GrayImage {
        let radius = self.morphology.blur_radius;
        if radius == 0 {
            return gray;
        }
        box_filter(&gray, radius, radius)
    }

    fn clean_up(&self, mask: GrayImage) -> GrayImage {
        let mut cleaned = if self.morphology.dilation_radius > 0 {
            dilate(&mask, Norm::LInf, self.morphology.dilation_radius)
        } else {
            mask
        };
        if self.morphology.closing_radius > 0 {
            for _ in 0..self.morphology.closing_passes {
                cleaned = close(&cleaned, Norm::L1, self.morphology.closing_radius);
            }
        }
        cleaned
    }
}
