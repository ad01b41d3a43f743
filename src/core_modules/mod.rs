pub mod background_model;
pub mod blob;
pub mod blob_detector;
pub mod counter;
pub mod frame;
pub mod frame_processor;
pub mod line_crossing;
pub mod source;
pub mod speed;
pub mod tracker;
