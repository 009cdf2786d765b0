use crate::{
    body::{BODY_LANDMARK_COUNT, POSE_CONNECTIONS},
    types::{Frame, LandmarkResult},
};

const BONE_COLOR: [u8; 4] = [255, 255, 255, 255];
const JOINT_COLOR: [u8; 4] = [255, 64, 64, 255];
const JOINT_RADIUS: i32 = 3;
/// Landmarks less visible than this are left out of the overlay.
const MIN_VISIBILITY: f32 = 0.5;

/// Copy of `frame` with every detected skeleton drawn over it.
pub fn annotate(frame: &Frame, landmarks: &LandmarkResult) -> Frame {
    let mut annotated = frame.clone();
    for body in &landmarks.bodies {
        let points: Vec<Option<(f32, f32)>> = body
            .landmarks
            .iter()
            .take(BODY_LANDMARK_COUNT)
            .map(|lm| {
                (lm.visibility >= MIN_VISIBILITY)
                    .then(|| (lm.x * frame.width as f32, lm.y * frame.height as f32))
            })
            .collect();
        draw_skeleton(&mut annotated.rgba, frame.width, frame.height, &points);
    }
    annotated
}

/// Draws bones and joints for points in pixel coordinates. `None` marks a
/// joint that is not drawn, along with its bones.
pub fn draw_skeleton(rgba: &mut [u8], width: u32, height: u32, points: &[Option<(f32, f32)>]) {
    if rgba.len() < width as usize * height as usize * 4 {
        return;
    }

    for (from, to) in POSE_CONNECTIONS {
        let (Some(Some(a)), Some(Some(b))) = (points.get(from.index()), points.get(to.index()))
        else {
            continue;
        };
        draw_line(rgba, width, height, *a, *b, BONE_COLOR);
    }

    for (x, y) in points.iter().flatten() {
        draw_dot(rgba, width, height, *x as i32, *y as i32, JOINT_COLOR);
    }
}

fn put_pixel(rgba: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
        return;
    }
    let offset = (y as usize * width as usize + x as usize) * 4;
    rgba[offset..offset + 4].copy_from_slice(&color);
}

fn draw_line(
    rgba: &mut [u8],
    width: u32,
    height: u32,
    from: (f32, f32),
    to: (f32, f32),
    color: [u8; 4],
) {
    let (mut x0, mut y0) = (from.0 as i32, from.1 as i32);
    let (x1, y1) = (to.0 as i32, to.1 as i32);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel(rgba, width, height, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_dot(rgba: &mut [u8], width: u32, height: u32, cx: i32, cy: i32, color: [u8; 4]) {
    for dy in -JOINT_RADIUS..=JOINT_RADIUS {
        for dx in -JOINT_RADIUS..=JOINT_RADIUS {
            if dx * dx + dy * dy <= JOINT_RADIUS * JOINT_RADIUS {
                put_pixel(rgba, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        body::BodyPart,
        types::{BodyPose, Landmark},
    };

    fn blank(width: u32, height: u32) -> Frame {
        Frame {
            rgba: vec![0; (width * height * 4) as usize],
            width,
            height,
            timestamp_ms: 0,
            sequence: 0,
        }
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * frame.width + x) * 4) as usize;
        frame.rgba[offset..offset + 4].try_into().unwrap()
    }

    #[test]
    fn test_no_bodies_leaves_frame_untouched() {
        let frame = blank(16, 16);
        let annotated = annotate(&frame, &LandmarkResult::empty(0));
        assert_eq!(annotated.rgba, frame.rgba);
    }

    #[test]
    fn test_draws_bone_between_visible_joints() {
        let frame = blank(40, 40);
        let mut landmarks = vec![Landmark::new(0.0, 0.0, 0.0, 0.0); BODY_LANDMARK_COUNT];
        landmarks[BodyPart::LeftShoulder.index()] = Landmark::new(0.25, 0.5, 0.0, 1.0);
        landmarks[BodyPart::RightShoulder.index()] = Landmark::new(0.75, 0.5, 0.0, 1.0);
        let result = LandmarkResult {
            timestamp_ms: 0,
            bodies: vec![BodyPose::new(landmarks)],
        };

        let annotated = annotate(&frame, &result);
        assert_eq!(pixel(&annotated, 20, 20), BONE_COLOR);
        assert_eq!(pixel(&annotated, 10, 20), JOINT_COLOR);
        // invisible joints are skipped
        assert_eq!(pixel(&annotated, 0, 0), [0, 0, 0, 0]);
        assert_eq!(annotated.sequence, frame.sequence);
    }

    #[test]
    fn test_out_of_bounds_points_are_clipped() {
        let mut rgba = vec![0; 8 * 8 * 4];
        let mut points = vec![None; BODY_LANDMARK_COUNT];
        points[BodyPart::LeftHip.index()] = Some((-20.0, 4.0));
        points[BodyPart::RightHip.index()] = Some((30.0, 4.0));
        draw_skeleton(&mut rgba, 8, 8, &points);
        let offset = (4 * 8 + 4) * 4;
        assert_eq!(&rgba[offset..offset + 4], &BONE_COLOR);
    }
}
