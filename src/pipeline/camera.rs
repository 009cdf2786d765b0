use std::{path::PathBuf, time::Instant};

use anyhow::{Context, Result, anyhow};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType,
    },
};
use rayon::prelude::*;

use super::{FrameSource, PoseBackend, landmarker::OrtLandmarker};
use crate::types::Frame;

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::MJPEG,
    FrameFormat::NV12,
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: format_camera_label(&info),
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    let name = info.human_name();
    let index = info.index().as_string();
    format!("{name} (#{index})")
}

/// One line listing every device, used when the configured index fails.
fn describe_devices(devices: &[CameraDevice]) -> String {
    if devices.is_empty() {
        return "none".to_string();
    }
    devices
        .iter()
        .map(|device| device.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// Native camera read synchronously from the worker thread.
pub struct NokhwaSource {
    camera: Camera,
    opened_at: Instant,
    last_timestamp_ms: u64,
    sequence: u64,
    released: bool,
}

impl NokhwaSource {
    pub fn open(index: CameraIndex) -> Result<Self> {
        let camera = match build_camera(index.clone()) {
            Ok(camera) => camera,
            Err(err) => {
                match available_cameras() {
                    Ok(devices) => log::warn!("available cameras: {}", describe_devices(&devices)),
                    Err(query_err) => log::warn!("failed to list cameras: {query_err:?}"),
                }
                return Err(err.context(format!("failed to open camera {}", index.as_string())));
            }
        };
        log::info!(
            "camera {} streaming {} @ {}fps",
            index.as_string(),
            camera.resolution(),
            camera.frame_rate()
        );
        Ok(Self {
            camera,
            opened_at: Instant::now(),
            last_timestamp_ms: 0,
            sequence: 0,
            released: false,
        })
    }
}

impl FrameSource for NokhwaSource {
    fn read(&mut self) -> Result<Frame> {
        let frame = self.camera.frame().context("camera frame read failed")?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("failed to decode camera frame")?;

        let (width, height) = decoded.dimensions();
        let rgb = decoded.into_raw();
        if rgb.is_empty() {
            return Err(anyhow!("camera returned an empty frame"));
        }

        let pixel_count = rgb.len() / 3;
        let mut rgba = vec![0u8; pixel_count * 4];
        rgba.par_chunks_mut(4)
            .zip(rgb.par_chunks_exact(3))
            .for_each(|(dst, src)| {
                dst[0] = src[0];
                dst[1] = src[1];
                dst[2] = src[2];
                dst[3] = 255;
            });

        self.last_timestamp_ms = self.opened_at.elapsed().as_millis() as u64;
        let sequence = self.sequence;
        self.sequence += 1;

        Ok(Frame {
            rgba,
            width,
            height,
            timestamp_ms: self.last_timestamp_ms,
            sequence,
        })
    }

    fn timestamp_ms(&self) -> u64 {
        self.last_timestamp_ms
    }

    fn is_open(&self) -> bool {
        !self.released && self.camera.is_stream_open()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    }
}

/// Camera plus ONNX landmark model, both opened on the worker thread.
#[derive(Clone, Debug)]
pub struct NokhwaBackend {
    index: CameraIndex,
    landmarker_path: PathBuf,
    presence_threshold: f32,
}

impl NokhwaBackend {
    pub fn new(index: u32, landmarker_path: impl Into<PathBuf>, presence_threshold: f32) -> Self {
        Self {
            index: CameraIndex::Index(index),
            landmarker_path: landmarker_path.into(),
            presence_threshold,
        }
    }
}

impl PoseBackend for NokhwaBackend {
    type Source = NokhwaSource;
    type Landmarker = OrtLandmarker;

    fn label(&self) -> &'static str {
        "nokhwa+ort"
    }

    fn open_source(&mut self) -> Result<NokhwaSource> {
        NokhwaSource::open(self.index.clone())
    }

    fn load_landmarker(&mut self) -> Result<OrtLandmarker> {
        OrtLandmarker::new(&self.landmarker_path, self.presence_threshold)
    }
}
