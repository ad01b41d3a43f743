//! Error types for traffic_counter

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Frame decode error: {0}")]
    FrameDecode(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Frame is {actual_width}x{actual_height} but the background model was built for {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Event sink error: {0}")]
    Sink(String),

    #[error("Display error: {0}")]
    Display(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
