use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::{ImageBuffer, Rgba, imageops::FilterType};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use rayon::prelude::*;

use super::LandmarkModel;
use crate::{
    body::BODY_LANDMARK_COUNT,
    types::{BodyPose, Frame, Landmark, LandmarkResult},
};

/// Side of the square model input.
pub const INPUT_SIZE: u32 = 256;
/// The model emits 39 points; the last 6 are auxiliary ROI points.
const OUTPUT_POINTS: usize = 39;
const VALUES_PER_POINT: usize = 5;

/// BlazePose full-body landmark model on ONNX Runtime. Expects NHWC RGB input
/// in `0..=1`, outputs landmark coordinates in input pixels and a pose
/// presence score.
pub struct OrtLandmarker {
    session: Session,
    presence_threshold: f32,
}

impl OrtLandmarker {
    pub fn new(model_path: &Path, presence_threshold: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;

        log::info!("pose landmark model ready using {}", model_path.display());
        Ok(Self {
            session,
            presence_threshold,
        })
    }
}

impl LandmarkModel for OrtLandmarker {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<LandmarkResult> {
        let (input, letterbox) = prepare_input(frame, INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "pose model returned {} outputs, expected landmarks and presence",
                outputs.len()
            ));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let presence = outputs[1]
            .try_extract_array::<f32>()
            .ok()
            .and_then(|arr| arr.iter().next().copied())
            .unwrap_or(0.0);

        decode_landmarks(
            &flattened,
            presence,
            self.presence_threshold,
            &letterbox,
            timestamp_ms,
        )
    }
}

/// Placement of the frame inside the square model input.
#[derive(Clone, Debug, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    width: f32,
    height: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, side: u32) -> Self {
        let scale = side as f32 / width.max(height) as f32;
        let scaled_w = (width as f32 * scale).round();
        let scaled_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((side as f32 - scaled_w) / 2.0).floor(),
            pad_y: ((side as f32 - scaled_h) / 2.0).floor(),
            width: width as f32,
            height: height as f32,
        }
    }

    fn scaled_size(&self) -> (u32, u32) {
        (
            ((self.width * self.scale).round() as u32).max(1),
            ((self.height * self.scale).round() as u32).max(1),
        )
    }

    /// Maps a point in model input pixels back to normalized frame coordinates.
    fn to_normalized(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x) / self.scale / self.width,
            (y - self.pad_y) / self.scale / self.height,
        )
    }
}

fn prepare_input(frame: &Frame, side: u32) -> Result<(Array4<f32>, Letterbox)> {
    if frame.width == 0 || frame.height == 0 {
        return Err(anyhow!("empty frame"));
    }
    let source = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(
        frame.width,
        frame.height,
        frame.rgba.as_slice(),
    )
    .ok_or_else(|| {
        anyhow!(
            "frame buffer of {} bytes does not match {}x{}",
            frame.rgba.len(),
            frame.width,
            frame.height
        )
    })?;

    let letterbox = Letterbox::fit(frame.width, frame.height, side);
    let (scaled_w, scaled_h) = letterbox.scaled_size();
    let resized = image::imageops::resize(&source, scaled_w, scaled_h, FilterType::Triangle);

    let side = side as usize;
    let pad_x = letterbox.pad_x as usize;
    let pad_y = letterbox.pad_y as usize;
    let mut input = Array4::<f32>::zeros((1, side, side, 3));
    let buffer = input
        .as_slice_mut()
        .ok_or_else(|| anyhow!("input tensor is not contiguous"))?;

    buffer
        .par_chunks_mut(side * 3)
        .enumerate()
        .for_each(|(y, row)| {
            let Some(src_y) = y.checked_sub(pad_y).filter(|sy| *sy < scaled_h as usize) else {
                return;
            };
            for src_x in 0..(scaled_w as usize).min(side - pad_x) {
                let pixel = resized.get_pixel(src_x as u32, src_y as u32);
                let offset = (src_x + pad_x) * 3;
                row[offset] = pixel[0] as f32 / 255.0;
                row[offset + 1] = pixel[1] as f32 / 255.0;
                row[offset + 2] = pixel[2] as f32 / 255.0;
            }
        });

    Ok((input, letterbox))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn decode_landmarks(
    raw: &[f32],
    presence: f32,
    presence_threshold: f32,
    letterbox: &Letterbox,
    timestamp_ms: u64,
) -> Result<LandmarkResult> {
    if raw.len() < OUTPUT_POINTS * VALUES_PER_POINT {
        return Err(anyhow!(
            "expected {} landmark values, got {}",
            OUTPUT_POINTS * VALUES_PER_POINT,
            raw.len()
        ));
    }
    if presence < presence_threshold {
        return Ok(LandmarkResult::empty(timestamp_ms));
    }

    let landmarks = raw
        .chunks_exact(VALUES_PER_POINT)
        .take(BODY_LANDMARK_COUNT)
        .map(|values| {
            let (x, y) = letterbox.to_normalized(values[0], values[1]);
            // z shares the x scale
            let z = values[2] / letterbox.scale / letterbox.width;
            Landmark::new(x, y, z, sigmoid(values[3]))
        })
        .collect();

    Ok(LandmarkResult {
        timestamp_ms,
        bodies: vec![BodyPose::new(landmarks)],
    })
}
