use image::{DynamicImage, RgbImage};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use traffic_counter::{Error, Frame, FrameSource, Result};

/// Maps an OpenCV failure onto the library error a source is allowed to return.
pub fn decode_error(e: opencv::Error) -> Error {
    Error::FrameDecode(e.message)
}

/// Reads a video file (or capture device URL) frame by frame through OpenCV.
pub struct VideoFileSource {
    cap: VideoCapture,
    next_index: u64,
}

impl VideoFileSource {
    pub fn open(path: &str) -> Result<Self> {
        let cap = VideoCapture::from_file(path, videoio::CAP_ANY)
            .map_err(|e| Error::SourceUnavailable(format!("{path}: {}", e.message)))?;
        let opened = cap
            .is_opened()
            .map_err(|e| Error::SourceUnavailable(e.message))?;
        if !opened {
            return Err(Error::SourceUnavailable(format!("cannot open video {path}")));
        }
        Ok(Self { cap, next_index: 0 })
    }

    pub fn frame_size(&self) -> (i32, i32) {
        let width = self.cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
        let height = self.cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
        (width as i32, height as i32)
    }

    pub fn fps(&self) -> f64 {
        self.cap.get(videoio::CAP_PROP_FPS).unwrap_or(0.0)
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut bgr = Mat::default();
        if !self.cap.read(&mut bgr).map_err(decode_error)? || bgr.empty() {
            return Ok(None);
        }

        // --- 1. BGR -> RGB ---
        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(decode_error)?;
        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let bytes = rgb.data_bytes().map_err(decode_error)?.to_vec();

        // --- 2. Wrap as an image buffer ---
        let image = RgbImage::from_raw(width, height, bytes).ok_or_else(|| {
            Error::FrameDecode(format!("frame {} is not a packed {width}x{height} RGB buffer", self.next_index))
        })?;

        let frame = Frame::new(self.next_index, DynamicImage::ImageRgb8(image));
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if let Err(e) = self.cap.release() {
            tracing::warn!(error = %e.message, "failed to release video capture");
        }
    }
}
