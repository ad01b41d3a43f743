use opencv::{
    core::{self, Mat, Scalar},
    highgui, imgproc,
    prelude::*,
    videoio::VideoWriter,
};
use traffic_counter::sinks::DisplaySink;
use traffic_counter::{Error, Frame, FrameReport, MotionMask, Result, StopHandle};

const ESC: i32 = 27;
const LINE_START_X: i32 = 25;
const LINE_END_X: i32 = 1200;
const COUNT_THICKNESS: i32 = 2;

fn display_error(e: opencv::Error) -> Error {
    Error::Display(e.message)
}

// OpenCV colours are BGR.
fn line_colour(triggered: bool) -> Scalar {
    if triggered {
        Scalar::new(0.0, 127.0, 255.0, 0.0)
    } else {
        Scalar::new(255.0, 127.0, 0.0, 0.0)
    }
}

fn count_label(count: u64) -> String {
    format!("VEHICLE COUNT: {count}")
}

/// Packs an 8-bit buffer into a freshly allocated `Mat` of the given type.
fn mat_from_bytes(width: u32, height: u32, typ: i32, bytes: &[u8]) -> opencv::Result<Mat> {
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, typ, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(bytes);
    Ok(mat)
}

/// Shows the annotated frame and the motion mask in two HighGUI windows. Escape
/// asks the orchestrator to stop. Optionally records the annotated frames.
pub struct HighGuiDisplay {
    stop: StopHandle,
    writer: Option<VideoWriter>,
}

impl HighGuiDisplay {
    pub fn new(stop: StopHandle, writer: Option<VideoWriter>) -> Self {
        Self { stop, writer }
    }

    fn annotate(&self, frame: &Frame, report: &FrameReport) -> opencv::Result<Mat> {
        // --- 1. Frame -> BGR Mat ---
        let rgb = frame.image().to_rgb8();
        let rgb_mat = mat_from_bytes(frame.width(), frame.height(), core::CV_8UC3, rgb.as_raw())?;
        let mut canvas = Mat::default();
        imgproc::cvt_color(&rgb_mat, &mut canvas, imgproc::COLOR_RGB2BGR, 0)?;

        // --- 2. Detection line ---
        let y = report.line.position as i32;
        imgproc::line(
            &mut canvas,
            core::Point::new(LINE_START_X, y),
            core::Point::new(LINE_END_X, y),
            line_colour(report.line_triggered()),
            3,
            imgproc::LINE_8,
            0,
        )?;

        // --- 3. Blobs and tracked points ---
        for blob in &report.blobs {
            let b = blob.bounding_box;
            imgproc::rectangle(
                &mut canvas,
                core::Rect::new(b.x as i32, b.y as i32, b.width as i32, b.height as i32),
                Scalar::new(0.0, 255.0, 0.0, 0.0),
                2,
                imgproc::LINE_8,
                0,
            )?;
        }
        for point in &report.tracked {
            imgproc::circle(
                &mut canvas,
                core::Point::new(point.x as i32, point.y as i32),
                4,
                Scalar::new(0.0, 0.0, 255.0, 0.0),
                -1,
                imgproc::LINE_8,
                0,
            )?;
        }

        // --- 4. Running count ---
        imgproc::put_text(
            &mut canvas,
            &count_label(report.vehicle_count),
            core::Point::new(450, 70),
            imgproc::FONT_HERSHEY_SIMPLEX,
            2.0,
            Scalar::new(0.0, 0.0, 255.0, 0.0),
            COUNT_THICKNESS,
            imgproc::LINE_8,
            false,
        )?;
        Ok(canvas)
    }
}

impl DisplaySink for HighGuiDisplay {
    fn show(&mut self, frame: &Frame, mask: &MotionMask, report: &FrameReport) -> Result<()> {
        let canvas = self.annotate(frame, report).map_err(display_error)?;
        let mask_mat = mat_from_bytes(
            mask.width(),
            mask.height(),
            core::CV_8UC1,
            mask.as_image().as_raw(),
        )
        .map_err(display_error)?;

        if let Some(writer) = self.writer.as_mut() {
            writer.write(&canvas).map_err(display_error)?;
        }
        highgui::imshow("Vehicle Counter", &canvas).map_err(display_error)?;
        highgui::imshow("Motion Mask", &mask_mat).map_err(display_error)?;

        if highgui::wait_key(1).map_err(display_error)? == ESC {
            self.stop.stop();
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.release() {
                tracing::warn!(error = %e.message, "failed to finalise output video");
            }
        }
        if let Err(e) = highgui::destroy_all_windows() {
            tracing::warn!(error = %e.message, "failed to close windows");
        }
    }
}
