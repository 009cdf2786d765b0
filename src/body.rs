/// Number of landmarks the pose model reports per body.
pub const BODY_LANDMARK_COUNT: usize = 33;

/// BlazePose body landmark indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BodyPart {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl BodyPart {
    pub const ALL: [BodyPart; BODY_LANDMARK_COUNT] = [
        BodyPart::Nose,
        BodyPart::LeftEyeInner,
        BodyPart::LeftEye,
        BodyPart::LeftEyeOuter,
        BodyPart::RightEyeInner,
        BodyPart::RightEye,
        BodyPart::RightEyeOuter,
        BodyPart::LeftEar,
        BodyPart::RightEar,
        BodyPart::MouthLeft,
        BodyPart::MouthRight,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftPinky,
        BodyPart::RightPinky,
        BodyPart::LeftIndex,
        BodyPart::RightIndex,
        BodyPart::LeftThumb,
        BodyPart::RightThumb,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::LeftKnee,
        BodyPart::RightKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
        BodyPart::LeftHeel,
        BodyPart::RightHeel,
        BodyPart::LeftFootIndex,
        BodyPart::RightFootIndex,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Eyes, mouth, fingers and feet carry little signal for whole-body
    /// exercises and are left out of the classifier input.
    pub fn is_discarded(self) -> bool {
        DISCARDED_PARTS.contains(&self)
    }
}

/// Landmarks dropped from the feature vector. Must match the layout the
/// classifier was trained on.
pub const DISCARDED_PARTS: [BodyPart; 18] = [
    BodyPart::LeftEyeInner,
    BodyPart::LeftEye,
    BodyPart::LeftEyeOuter,
    BodyPart::RightEyeInner,
    BodyPart::RightEye,
    BodyPart::RightEyeOuter,
    BodyPart::MouthLeft,
    BodyPart::MouthRight,
    BodyPart::LeftPinky,
    BodyPart::RightPinky,
    BodyPart::LeftIndex,
    BodyPart::RightIndex,
    BodyPart::LeftThumb,
    BodyPart::RightThumb,
    BodyPart::LeftHeel,
    BodyPart::RightHeel,
    BodyPart::LeftFootIndex,
    BodyPart::RightFootIndex,
];

/// Landmarks kept in the feature vector, in output order.
pub const KEPT_PARTS: [BodyPart; BODY_LANDMARK_COUNT - DISCARDED_PARTS.len()] = [
    BodyPart::Nose,
    BodyPart::LeftEar,
    BodyPart::RightEar,
    BodyPart::LeftShoulder,
    BodyPart::RightShoulder,
    BodyPart::LeftElbow,
    BodyPart::RightElbow,
    BodyPart::LeftWrist,
    BodyPart::RightWrist,
    BodyPart::LeftHip,
    BodyPart::RightHip,
    BodyPart::LeftKnee,
    BodyPart::RightKnee,
    BodyPart::LeftAnkle,
    BodyPart::RightAnkle,
];

/// Skeleton edges used when drawing a detected body.
pub const POSE_CONNECTIONS: &[(BodyPart, BodyPart)] = &[
    (BodyPart::Nose, BodyPart::LeftEyeInner),
    (BodyPart::LeftEyeInner, BodyPart::LeftEye),
    (BodyPart::LeftEye, BodyPart::LeftEyeOuter),
    (BodyPart::LeftEyeOuter, BodyPart::LeftEar),
    (BodyPart::Nose, BodyPart::RightEyeInner),
    (BodyPart::RightEyeInner, BodyPart::RightEye),
    (BodyPart::RightEye, BodyPart::RightEyeOuter),
    (BodyPart::RightEyeOuter, BodyPart::RightEar),
    (BodyPart::MouthLeft, BodyPart::MouthRight),
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::LeftWrist, BodyPart::LeftPinky),
    (BodyPart::LeftWrist, BodyPart::LeftIndex),
    (BodyPart::LeftWrist, BodyPart::LeftThumb),
    (BodyPart::LeftPinky, BodyPart::LeftIndex),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::RightWrist, BodyPart::RightPinky),
    (BodyPart::RightWrist, BodyPart::RightIndex),
    (BodyPart::RightWrist, BodyPart::RightThumb),
    (BodyPart::RightPinky, BodyPart::RightIndex),
    (BodyPart::LeftShoulder, BodyPart::LeftHip),
    (BodyPart::RightShoulder, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
    (BodyPart::LeftAnkle, BodyPart::LeftHeel),
    (BodyPart::RightAnkle, BodyPart::RightHeel),
    (BodyPart::LeftHeel, BodyPart::LeftFootIndex),
    (BodyPart::RightHeel, BodyPart::RightFootIndex),
    (BodyPart::LeftAnkle, BodyPart::LeftFootIndex),
    (BodyPart::RightAnkle, BodyPart::RightFootIndex),
];
