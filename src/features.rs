use crate::{
    body::KEPT_PARTS,
    types::{BodyPose, LandmarkResult},
};

/// Values emitted per kept landmark: x, y, z, visibility.
pub const VALUES_PER_LANDMARK: usize = 4;
pub const FEATURE_LEN: usize = KEPT_PARTS.len() * VALUES_PER_LANDMARK;

pub type FeatureVector = Vec<f32>;

/// Flattens the first detected body into the classifier input layout.
///
/// Returns `None` when nothing was detected. Only the first body is read; any
/// additional people in the frame are ignored.
pub fn extract(result: &LandmarkResult) -> Option<FeatureVector> {
    let body = result.primary()?;
    if result.bodies.len() > 1 {
        log::debug!(
            "{} bodies detected at {}ms, classifying the first",
            result.bodies.len(),
            result.timestamp_ms
        );
    }
    extract_body(body)
}

fn extract_body(body: &BodyPose) -> Option<FeatureVector> {
    if !body.is_complete() {
        log::warn!(
            "landmark result has {} points, expected a full body",
            body.landmarks.len()
        );
        return None;
    }

    let mut features = Vec::with_capacity(FEATURE_LEN);
    for part in KEPT_PARTS {
        let lm = &body.landmarks[part.index()];
        features.extend_from_slice(&[lm.x, lm.y, lm.z, lm.visibility]);
    }
    Some(features)
}

/// Column names matching [`extract`]'s output, as written by the training
/// data gatherer (`x0,y0,z0,v0,x1,...`).
pub fn feature_names() -> Vec<String> {
    (0..KEPT_PARTS.len())
        .flat_map(|i| ["x", "y", "z", "v"].map(|axis| format!("{axis}{i}")))
        .collect()
}
