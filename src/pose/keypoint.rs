use nalgebra::Vector3;

/// 3D骨格の19関節インデックス（Panoptic 形式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum JointIndex {
    Neck = 0,
    Nose = 1,
    BodyCenter = 2,
    LeftShoulder = 3,
    LeftElbow = 4,
    LeftWrist = 5,
    LeftHip = 6,
    LeftKnee = 7,
    LeftAnkle = 8,
    RightShoulder = 9,
    RightElbow = 10,
    RightWrist = 11,
    RightHip = 12,
    RightKnee = 13,
    RightAnkle = 14,
    RightEye = 15,
    LeftEye = 16,
    RightEar = 17,
    LeftEar = 18,
}

impl JointIndex {
    pub const COUNT: usize = 19;
}

/// ヒートマップ上の18キーポイント（COCO 形式、ネック付き）の数
pub const COCO_KEYPOINT_COUNT: usize = 18;

/// COCO 順キーポイント → Panoptic 関節。骨盤（BodyCenter）は2Dでは検出されない。
pub const COCO_TO_JOINT: [JointIndex; COCO_KEYPOINT_COUNT] = [
    JointIndex::Nose,
    JointIndex::Neck,
    JointIndex::RightShoulder,
    JointIndex::RightElbow,
    JointIndex::RightWrist,
    JointIndex::LeftShoulder,
    JointIndex::LeftElbow,
    JointIndex::LeftWrist,
    JointIndex::RightHip,
    JointIndex::RightKnee,
    JointIndex::RightAnkle,
    JointIndex::LeftHip,
    JointIndex::LeftKnee,
    JointIndex::LeftAnkle,
    JointIndex::RightEye,
    JointIndex::LeftEye,
    JointIndex::RightEar,
    JointIndex::LeftEar,
];

/// 2Dキーポイント
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// 信頼度スコア
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// 信頼度が閾値より大きいか
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.confidence > threshold
    }

    /// ピクセル座標（切り捨て）
    pub fn to_pixel(&self) -> (i32, i32) {
        (self.x as i32, self.y as i32)
    }
}

/// 1人分の2D姿勢。未検出の関節は None。
#[derive(Debug, Clone, PartialEq)]
pub struct Pose2d {
    pub keypoints: [Option<Keypoint>; JointIndex::COUNT],
    /// 姿勢全体のスコア
    pub score: f32,
}

impl Pose2d {
    pub fn new(keypoints: [Option<Keypoint>; JointIndex::COUNT], score: f32) -> Self {
        Self { keypoints, score }
    }

    pub fn get(&self, index: JointIndex) -> Option<&Keypoint> {
        self.keypoints[index as usize].as_ref()
    }

    /// 検出済みキーポイントの外接矩形 (x, y, width, height)
    pub fn bounding_box(&self) -> Option<(f32, f32, f32, f32)> {
        let mut found = self.keypoints.iter().flatten();
        let first = found.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for kp in found {
            min_x = min_x.min(kp.x);
            min_y = min_y.min(kp.y);
            max_x = max_x.max(kp.x);
            max_y = max_y.max(kp.y);
        }
        // 整数ピクセルの包含矩形なので +1
        Some((min_x, min_y, max_x - min_x + 1.0, max_y - min_y + 1.0))
    }
}

/// 3D関節
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint3d {
    pub position: Vector3<f32>,
    /// 対応する2Dキーポイントの信頼度。未検出は -1。
    pub confidence: f32,
}

impl Joint3d {
    pub const NOT_FOUND: f32 = -1.0;

    pub fn new(position: Vector3<f32>, confidence: f32) -> Self {
        Self { position, confidence }
    }
}

impl Default for Joint3d {
    fn default() -> Self {
        Self {
            position: Vector3::new(-1.0, -1.0, -1.0),
            confidence: Self::NOT_FOUND,
        }
    }
}

/// 1人分の3D姿勢（19関節）
#[derive(Debug, Clone, PartialEq)]
pub struct Pose3d {
    pub joints: [Joint3d; JointIndex::COUNT],
}

impl Pose3d {
    pub fn new(joints: [Joint3d; JointIndex::COUNT]) -> Self {
        Self { joints }
    }

    pub fn get(&self, index: JointIndex) -> &Joint3d {
        &self.joints[index as usize]
    }

    /// 全関節を平行移動
    pub fn translate(&mut self, offset: &Vector3<f32>) {
        for joint in &mut self.joints {
            joint.position += offset;
        }
    }
}

impl Default for Pose3d {
    fn default() -> Self {
        Self {
            joints: [Joint3d::default(); JointIndex::COUNT],
        }
    }
}
