//! Camera-to-world transform, display axes and bone export.

use nalgebra::{Matrix3, Vector3};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pose::Pose3d;

pub const DEFAULT_EXTRINSICS_PATH: &str = "data/extrinsics.json";

/// 送信するボーンの数
pub const BONE_COUNT: usize = 17;

/// 3D キャンバス・2D オーバーレイに描く骨格（Panoptic 関節の組）
pub const SKELETON_EDGES: [(usize, usize); 17] = [
    (0, 1), (1, 16), (16, 18), (1, 15), (15, 17),
    (0, 3), (3, 4), (4, 5),
    (0, 9), (9, 10), (10, 11),
    (0, 6), (6, 7), (7, 8),
    (0, 12), (12, 13), (13, 14),
];

/// ゲームエンジン側のリグのボーン順（両端の関節）。両端が同じものは関節位置そのもの。
pub const EXPORT_EDGES: [(usize, usize); BONE_COUNT] = [
    (2, 0),   // 0: 背骨下部
    (6, 7),   // 1: 左太もも
    (7, 8),   // 2: 左すね
    (12, 13), // 3: 右太もも
    (13, 14), // 4: 右すね
    (2, 6),   // 5: 左腰
    (2, 12),  // 6: 右腰
    (2, 2),   // 7: 背骨上部（ボーン0と平均）
    (0, 0),   // 8: 首
    (0, 1),   // 9: 首から鼻
    (1, 1),   // 10: 頭（ボーン9から外挿）
    (3, 4),   // 11: 左上腕
    (4, 5),   // 12: 左前腕
    (9, 10),  // 13: 右上腕
    (10, 11), // 14: 右前腕
    (0, 3),   // 15: 左肩
    (0, 9),   // 16: 右肩
];

const SPINE_BONE: usize = 7;
const NECK_BONE: usize = 9;
const HEAD_BONE: usize = 10;

#[derive(Debug, Error)]
pub enum ExtrinsicsError {
    #[error("failed to read extrinsics {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid extrinsics JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rotation matrix is singular")]
    Singular,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranslationJson {
    Flat([f32; 3]),
    Column([[f32; 1]; 3]),
}

#[derive(Debug, Deserialize)]
struct ExtrinsicsJson {
    #[serde(rename = "R")]
    rotation: [[f32; 3]; 3],
    t: TranslationJson,
}

/// カメラの外部パラメータ（カメラ座標 → ワールド座標）
#[derive(Debug, Clone, PartialEq)]
pub struct Extrinsics {
    pub rotation: Matrix3<f32>,
    pub translation: Vector3<f32>,
    rotation_inv: Matrix3<f32>,
}

impl Extrinsics {
    pub fn new(rotation: Matrix3<f32>, translation: Vector3<f32>) -> Result<Self, ExtrinsicsError> {
        let rotation_inv = rotation.try_inverse().ok_or(ExtrinsicsError::Singular)?;
        Ok(Self {
            rotation,
            translation,
            rotation_inv,
        })
    }

    /// `{"R": [[..], [..], [..]], "t": [[x], [y], [z]]}`（t は平坦な配列も可）
    pub fn from_json(content: &str) -> Result<Self, ExtrinsicsError> {
        let json: ExtrinsicsJson = serde_json::from_str(content)?;
        let r = json.rotation;
        let rotation = Matrix3::new(
            r[0][0], r[0][1], r[0][2],
            r[1][0], r[1][1], r[1][2],
            r[2][0], r[2][1], r[2][2],
        );
        let translation = match json.t {
            TranslationJson::Flat(t) => Vector3::from(t),
            TranslationJson::Column(t) => Vector3::new(t[0][0], t[1][0], t[2][0]),
        };
        Self::new(rotation, translation)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExtrinsicsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ExtrinsicsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// p_world = R⁻¹ (p_cam - t)
    pub fn camera_to_world(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.rotation_inv * (point - self.translation)
    }
}

/// 全人物の全関節をワールド座標へ
pub fn rotate_poses(poses: &mut [Pose3d], extrinsics: &Extrinsics) {
    for pose in poses {
        for joint in &mut pose.joints {
            joint.position = extrinsics.camera_to_world(&joint.position);
        }
    }
}

/// 描画・送信用の軸へ並べ替え: (x, y, z) → (-z, x, -y)
pub fn to_display_axes(poses: &mut [Pose3d]) {
    for pose in poses {
        for joint in &mut pose.joints {
            let p = joint.position;
            joint.position = Vector3::new(-p.z, p.x, -p.y);
        }
    }
}

/// リグ用のボーン中点（EXPORT_EDGES 順）
pub fn bone_midpoints(pose: &Pose3d) -> [Vector3<f32>; BONE_COUNT] {
    let mut mids: [Vector3<f32>; BONE_COUNT] = std::array::from_fn(|i| {
        let (a, b) = EXPORT_EDGES[i];
        (pose.joints[a].position + pose.joints[b].position) / 2.0
    });
    mids[SPINE_BONE] = (mids[0] + mids[SPINE_BONE]) / 2.0;
    mids[HEAD_BONE] = mids[NECK_BONE] + (mids[HEAD_BONE] - mids[NECK_BONE]) * 2.0;
    mids
}

/// 先頭の人物のボーン中点。人物がいなければ None。
pub fn export_bones(poses: &[Pose3d]) -> Option<[Vector3<f32>; BONE_COUNT]> {
    poses.first().map(bone_midpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Joint3d, JointIndex};

    fn pose_with(f: impl Fn(usize) -> Vector3<f32>) -> Pose3d {
        Pose3d::new(std::array::from_fn(|i| Joint3d::new(f(i), 1.0)))
    }

    #[test]
    fn test_extrinsics_from_json_column_translation() {
        let json = r#"{"R": [[1, 0, 0], [0, 1, 0], [0, 0, 1]], "t": [[1.5], [2], [3]]}"#;
        let ext = Extrinsics::from_json(json).unwrap();
        assert_eq!(ext.translation, Vector3::new(1.5, 2.0, 3.0));
        assert_eq!(ext.rotation, Matrix3::identity());
    }

    #[test]
    fn test_extrinsics_from_json_flat_translation() {
        let json = r#"{"R": [[0, -1, 0], [1, 0, 0], [0, 0, 1]], "t": [0, 0, 10]}"#;
        let ext = Extrinsics::from_json(json).unwrap();
        assert_eq!(ext.translation, Vector3::new(0.0, 0.0, 10.0));
        assert_eq!(ext.rotation[(0, 1)], -1.0);
    }

    #[test]
    fn test_extrinsics_singular_rotation() {
        let json = r#"{"R": [[1, 0, 0], [1, 0, 0], [0, 0, 1]], "t": [0, 0, 0]}"#;
        assert!(matches!(Extrinsics::from_json(json), Err(ExtrinsicsError::Singular)));
    }

    #[test]
    fn test_extrinsics_bad_json() {
        assert!(matches!(Extrinsics::from_json("{\"R\": 1}"), Err(ExtrinsicsError::Json(_))));
    }

    #[test]
    fn test_extrinsics_missing_file() {
        let err = Extrinsics::load("does/not/exist.json").unwrap_err();
        assert!(matches!(err, ExtrinsicsError::Io { .. }));
        assert!(err.to_string().contains("does/not/exist.json"));
    }

    #[test]
    fn test_camera_to_world_inverts_rotation() {
        // z 軸まわり 90°
        let rotation = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let ext = Extrinsics::new(rotation, Vector3::new(0.0, 0.0, 10.0)).unwrap();
        let world = Vector3::new(1.0, 2.0, 3.0);
        let camera = rotation * world + ext.translation;
        let back = ext.camera_to_world(&camera);
        assert!((back - world).norm() < 1e-5);
    }

    #[test]
    fn test_rotate_poses_applies_to_every_joint() {
        let ext = Extrinsics::new(Matrix3::identity(), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        let mut poses = vec![pose_with(|i| Vector3::new(i as f32, 0.0, 0.0)); 2];
        rotate_poses(&mut poses, &ext);
        for pose in &poses {
            for (i, joint) in pose.joints.iter().enumerate() {
                assert_eq!(joint.position, Vector3::new(i as f32 - 1.0, -1.0, -1.0));
                assert_eq!(joint.confidence, 1.0);
            }
        }
    }

    #[test]
    fn test_to_display_axes() {
        let mut poses = vec![pose_with(|_| Vector3::new(1.0, 2.0, 3.0))];
        to_display_axes(&mut poses);
        assert_eq!(poses[0].joints[0].position, Vector3::new(-3.0, 1.0, -2.0));
    }

    #[test]
    fn test_bone_midpoints() {
        let pose = pose_with(|i| Vector3::new(i as f32, 0.0, 0.0));
        let mids = bone_midpoints(&pose);

        // (2, 0) -> 1
        assert_eq!(mids[0].x, 1.0);
        // (6, 7) -> 6.5
        assert_eq!(mids[1].x, 6.5);
        // 背骨上部: (関節2 + ボーン0) / 2 = (2 + 1) / 2
        assert_eq!(mids[SPINE_BONE].x, 1.5);
        // 首: 関節0 そのもの
        assert_eq!(mids[8].x, 0.0);
        // 頭: ボーン9 (0.5) + (関節1 - 0.5) * 2 = 1.5
        assert_eq!(mids[NECK_BONE].x, 0.5);
        assert_eq!(mids[HEAD_BONE].x, 1.5);
        // (10, 11) -> 10.5
        assert_eq!(mids[14].x, 10.5);
    }

    #[test]
    fn test_export_bones_uses_first_person() {
        assert!(export_bones(&[]).is_none());
        let poses = [
            pose_with(|_| Vector3::new(1.0, 1.0, 1.0)),
            pose_with(|_| Vector3::new(9.0, 9.0, 9.0)),
        ];
        let bones = export_bones(&poses).unwrap();
        assert!(bones.iter().all(|b| *b == Vector3::new(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_edges_reference_valid_joints() {
        for (a, b) in SKELETON_EDGES.iter().chain(EXPORT_EDGES.iter()) {
            assert!(*a < JointIndex::COUNT && *b < JointIndex::COUNT);
        }
    }
}
