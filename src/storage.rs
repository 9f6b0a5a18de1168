//! Crop persistence: the one piece of "storage" the core itself is responsible for.
//! Everything downstream (row storage, object-store upload, dashboards) is an external
//! collaborator that only ever sees the path this module writes to.

use std::path::{Path, PathBuf};

use opencv::core::{Mat, Rect, CV_8UC3};
use opencv::prelude::*;

use crate::types::{BoundingBox, Frame};

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("crop region fell outside the frame bounds")]
    OutOfBounds,
    #[error("opencv operation failed while extracting the crop")]
    OpenCv,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Writes the plate sub-region of `frame` to `base_dir/plate_crops/track_<id>_frame_<n>.jpg`
/// and returns the path, matching the layout downstream services expect.
pub fn persist_plate_crop(
    base_dir: &Path,
    track_id: u64,
    frame: &Frame,
    plate_bbox: &BoundingBox,
) -> Result<PathBuf, CropError> {
    let mat = frame_to_mat(frame).ok_or(CropError::OpenCv)?;

    let roi = Rect::new(
        plate_bbox.x1.max(0.0) as i32,
        plate_bbox.y1.max(0.0) as i32,
        plate_bbox.width().max(1.0) as i32,
        plate_bbox.height().max(1.0) as i32,
    );
    let cropped = Mat::roi(&mat, roi).map_err(|_| CropError::OutOfBounds)?;

    let mut buf = opencv::core::Vector::<u8>::new();
    let params = opencv::core::Vector::<i32>::from_slice(&[opencv::imgcodecs::IMWRITE_JPEG_QUALITY, 90]);
    opencv::imgcodecs::imencode(".jpg", &cropped, &mut buf, &params).map_err(|_| CropError::OpenCv)?;

    let dir = base_dir.join("plate_crops");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("track_{}_frame_{}.jpg", track_id, frame.frame_number));
    std::fs::write(&path, buf.as_slice())?;
    Ok(path)
}

fn frame_to_mat(frame: &Frame) -> Option<Mat> {
    // SAFETY: `frame.data` is a contiguous BGR24 buffer of exactly width*height*3 bytes,
    // produced by the same decoder that set width/height; the Mat borrows it read-only
    // for the lifetime of this call.
    unsafe {
        Mat::new_rows_cols_with_data_unsafe(
            frame.height as i32,
            frame.width as i32,
            CV_8UC3,
            frame.data.as_ptr() as *mut std::ffi::c_void,
            opencv::core::Mat_AUTO_STEP,
        )
        .ok()
    }
}
