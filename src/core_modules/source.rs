// THEORY:
// A `FrameSource` is the pull-based boundary between the counter and whatever
// decodes video. The orchestrator asks for one frame at a time and treats `None`
// as the normal end of the stream. Decoding may block; the orchestrator runs one
// frame to completion before asking again, so a source never needs to buffer.
//
// Two sources ship with the library: a directory of still images (decoded with
// the `image` crate) and an in-memory queue used for tests and embedding. Video
// container decoding lives with the OpenCV companion binary.

use crate::core_modules::frame::Frame;
use crate::error::{Error, Result};
use image::DynamicImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// An ordered, pull-based producer of frames.
pub trait FrameSource {
    /// Returns the next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Releases any handle held on the underlying stream. Called once on STOPPED.
    fn release(&mut self) {}
}

/// Reads every image file in a directory, in file-name order, as one frame each.
pub struct ImageSequenceSource {
    paths: VecDeque<PathBuf>,
    next_index: u64,
}

impl ImageSequenceSource {
    /// Lists the directory up front. Fails if the directory cannot be read.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", dir.display(), e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        debug!(dir = %dir.display(), frames = paths.len(), "opened image sequence");

        Ok(Self {
            paths: paths.into(),
            next_index: 0,
        })
    }

    /// Frames not yet handed out.
    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .map_err(|e| Error::FrameDecode(format!("{}: {}", path.display(), e)))?;
        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.paths.clear();
    }
}

/// Serves a fixed list of images, stamping each with its position and the time it is pulled.
#[derive(Default)]
pub struct InMemorySource {
    images: VecDeque<DynamicImage>,
    next_index: u64,
    released: bool,
}

impl InMemorySource {
    pub fn new(images: impl IntoIterator<Item = DynamicImage>) -> Self {
        Self {
            images: images.into_iter().collect(),
            next_index: 0,
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl FrameSource for InMemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        Ok(self.images.pop_front().map(|image| {
            let frame = Frame::new(self.next_index, image);
            self.next_index += 1;
            frame
        }))
    }

    fn release(&mut self) {
        self.released = true;
        self.images.clear();
    }
}
