use std::fmt;

use crate::body::{BODY_LANDMARK_COUNT, BodyPart};

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture time reported by the source, in milliseconds since it opened.
    pub timestamp_ms: u64,
    /// Position of this frame in the source's output, starting at 0.
    pub sequence: u64,
}

impl Frame {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    pub fn position(&self) -> (f32, f32, f32) {
        (self.x, self.y, self.z)
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

/// One detected person, landmarks in canonical 33-point order.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyPose {
    pub landmarks: Vec<Landmark>,
}

impl BodyPose {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn get(&self, part: BodyPart) -> Option<&Landmark> {
        self.landmarks.get(part.index())
    }

    pub fn is_complete(&self) -> bool {
        self.landmarks.len() >= BODY_LANDMARK_COUNT
    }
}

/// Output of the landmark model for one frame. No bodies means nothing was
/// found, which is not an error.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkResult {
    pub timestamp_ms: u64,
    pub bodies: Vec<BodyPose>,
}

impl LandmarkResult {
    pub fn empty(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            bodies: Vec::new(),
        }
    }

    pub fn has_detection(&self) -> bool {
        !self.bodies.is_empty()
    }

    pub fn primary(&self) -> Option<&BodyPose> {
        self.bodies.first()
    }

    /// Position and visibility of one landmark on the primary body, or zeros
    /// when nothing was detected.
    pub fn point(&self, part: BodyPart) -> ((f32, f32, f32), f32) {
        self.primary()
            .and_then(|body| body.get(part))
            .map(|lm| (lm.position(), lm.visibility))
            .unwrap_or(((0.0, 0.0, 0.0), 0.0))
    }
}

/// Class label produced by the exercise classifier for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Verdict(pub i64);

impl Verdict {
    pub const NO_DETECTION: Verdict = Verdict(0);

    pub fn label(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 != 0
    }
}

impl From<i64> for Verdict {
    fn from(label: i64) -> Self {
        Verdict(label)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
