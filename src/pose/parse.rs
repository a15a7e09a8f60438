use anyhow::Result;
use nalgebra::Vector3;
use ndarray::{Array3, Axis};

use super::extract::{extract_poses, RawPose, UPSAMPLE_RATIO};
use super::keypoint::{Joint3d, JointIndex, Keypoint, Pose2d, Pose3d, COCO_TO_JOINT};
use super::network::NetworkOutput;
use super::preprocess::STRIDE;
use crate::tracker::PoseTracker;

/// 特徴マップの値（身長で正規化）をセンチメートルに戻す係数
pub const AVG_PERSON_HEIGHT: f32 = 180.0;

/// 3D座標を読むのに必要な2Dキーポイントの信頼度
const KEYPOINT_THRESHOLD: f32 = 0.1;

/// 末端側から根元側へ並べたリンク。最初に信頼できた関節の位置でリンク全体の3D座標を読み直す。
const LIMBS: [[JointIndex; 3]; 6] = [
    [JointIndex::LeftEar, JointIndex::RightEar, JointIndex::Nose],
    [JointIndex::LeftEye, JointIndex::RightEye, JointIndex::Nose],
    [JointIndex::LeftWrist, JointIndex::LeftElbow, JointIndex::LeftShoulder],
    [JointIndex::LeftAnkle, JointIndex::LeftKnee, JointIndex::LeftHip],
    [JointIndex::RightWrist, JointIndex::RightElbow, JointIndex::RightShoulder],
    [JointIndex::RightAnkle, JointIndex::RightKnee, JointIndex::RightHip],
];

/// 1フレーム分の解析結果（同じ添字が同じ人物）
#[derive(Debug, Clone, Default)]
pub struct ParsedPoses {
    /// カメラ座標系の3D姿勢（cm）
    pub poses_3d: Vec<Pose3d>,
    /// フレーム画素座標の2D姿勢
    pub poses_2d: Vec<Pose2d>,
    /// 追跡中の人物ID（追跡しない場合は空）
    pub track_ids: Vec<u32>,
}

/// ネットワーク出力を人物ごとの2D・3D姿勢に変換する
///
/// 動画入力では人物をフレーム間で追跡し、並進を One Euro フィルタで平滑化する。
pub struct PoseParser {
    stride: f32,
    upsample_ratio: usize,
    tracker: Option<PoseTracker>,
}

impl PoseParser {
    pub fn new(track: bool) -> Self {
        Self {
            stride: STRIDE as f32,
            upsample_ratio: UPSAMPLE_RATIO,
            tracker: track.then(PoseTracker::new),
        }
    }

    #[cfg(test)]
    pub fn with_upsample_ratio(mut self, ratio: usize) -> Self {
        self.upsample_ratio = ratio;
        self
    }

    /// - input_scale: 元フレームに対するネットワーク入力の縮尺
    /// - fx: 元フレームでの焦点距離（ピクセル）
    pub fn parse(&mut self, output: &NetworkOutput, input_scale: f32, fx: f32) -> Result<ParsedPoses> {
        let raw = extract_poses(output.heatmaps.view(), output.pafs.view(), self.upsample_ratio)?;
        let (poses_3d, poses_2d) = root_relative_poses(&raw, &output.features);
        let (map_h, map_w) = output.map_size();

        let poses_2d_scaled: Vec<Pose2d> = poses_2d
            .iter()
            .map(|p| scale_to_frame(p, self.stride, input_scale))
            .collect();

        let mut tracked = self.tracker.as_mut().map(|t| t.update(&poses_2d_scaled));
        let track_ids: Vec<u32> = tracked
            .as_deref()
            .map(|t| t.iter().map(|p| p.id).collect())
            .unwrap_or_default();

        let fx_scaled = fx * input_scale / self.stride;
        let mut translated = Vec::with_capacity(poses_3d.len());
        for (i, (mut pose_3d, pose_2d)) in poses_3d.into_iter().zip(&poses_2d).enumerate() {
            let (points_3d, points_2d): (Vec<_>, Vec<_>) = pose_2d
                .keypoints
                .iter()
                .enumerate()
                .filter_map(|(k, kp)| kp.map(|kp| (pose_3d.joints[k].position, (kp.x, kp.y))))
                .unzip();

            if let Some(mut translation) =
                estimate_translation(&points_3d, &points_2d, (map_w as f32, map_h as f32), fx_scaled)
            {
                if let Some(tracked) = tracked.as_deref_mut() {
                    translation = tracked[i].filter.apply(translation);
                }
                pose_3d.translate(&translation);
            }
            translated.push(pose_3d);
        }

        Ok(ParsedPoses {
            poses_3d: translated,
            poses_2d: poses_2d_scaled,
            track_ids,
        })
    }
}

/// 特徴マップ上の2D姿勢と、首の位置などから読んだルート相対3D姿勢
///
/// 首が見つからない姿勢は捨てる。
pub fn root_relative_poses(raw: &[RawPose], features: &Array3<f32>) -> (Vec<Pose3d>, Vec<Pose2d>) {
    let mut poses_2d = Vec::new();
    for pose in raw {
        // COCO 1 = neck
        if pose.keypoints[1].is_none() {
            continue;
        }
        let mut keypoints = [None; JointIndex::COUNT];
        for (coco, kp) in pose.keypoints.iter().enumerate() {
            if let Some((x, y, conf)) = kp {
                keypoints[COCO_TO_JOINT[coco] as usize] = Some(Keypoint::new(*x, *y, *conf));
            }
        }
        poses_2d.push(Pose2d::new(keypoints, pose.score));
    }

    let poses_3d = poses_2d
        .iter()
        .map(|pose_2d| {
            let mut pose_3d = Pose3d::default();
            let Some(neck) = pose_2d.get(JointIndex::Neck).filter(|k| k.is_confident(KEYPOINT_THRESHOLD)) else {
                return pose_3d;
            };

            let neck_px = neck.to_pixel();
            for (k, joint) in pose_3d.joints.iter_mut().enumerate() {
                let confidence = pose_2d.keypoints[k].map_or(Joint3d::NOT_FOUND, |kp| kp.confidence);
                *joint = Joint3d::new(read_joint(features, k, neck_px), confidence);
            }

            for limb in &LIMBS {
                let anchor = limb
                    .iter()
                    .find_map(|&j| pose_2d.get(j).filter(|k| k.is_confident(KEYPOINT_THRESHOLD)));
                if let Some(anchor) = anchor {
                    let px = anchor.to_pixel();
                    for &j in limb {
                        pose_3d.joints[j as usize].position = read_joint(features, j as usize, px);
                    }
                }
            }
            pose_3d
        })
        .collect();

    (poses_3d, poses_2d)
}

/// 特徴マップから関節 `joint` の3D座標を (x, y) の位置で読む
fn read_joint(features: &Array3<f32>, joint: usize, (x, y): (i32, i32)) -> Vector3<f32> {
    let (_, h, w) = features.dim();
    let x = (x.max(0) as usize).min(w - 1);
    let y = (y.max(0) as usize).min(h - 1);
    let maps = features.slice_axis(Axis(0), (joint * 3..joint * 3 + 3).into());
    Vector3::new(maps[[0, y, x]], maps[[1, y, x]], maps[[2, y, x]]) * AVG_PERSON_HEIGHT
}

/// 特徴マップ座標の2D姿勢を元フレームの画素座標へ（切り捨て）
pub fn scale_to_frame(pose: &Pose2d, stride: f32, input_scale: f32) -> Pose2d {
    let keypoints = pose.keypoints.map(|kp| {
        kp.map(|kp| {
            Keypoint::new(
                (kp.x * stride / input_scale).trunc(),
                (kp.y * stride / input_scale).trunc(),
                kp.confidence,
            )
        })
    });
    Pose2d::new(keypoints, pose.score)
}

/// カメラ座標系での人物の並進を推定
///
/// 3D点の xy の広がりと、画像中心からの2D点の広がりの比をスケールとし、
/// 2D重心を焦点距離の奥行きへ持ち上げる。2D点が1点に潰れている場合は None。
pub fn estimate_translation(
    points_3d: &[Vector3<f32>],
    points_2d: &[(f32, f32)],
    (map_w, map_h): (f32, f32),
    fx_scaled: f32,
) -> Option<Vector3<f32>> {
    if points_3d.is_empty() || points_3d.len() != points_2d.len() {
        return None;
    }
    let n = points_3d.len() as f32;

    let centered: Vec<(f32, f32)> = points_2d
        .iter()
        .map(|&(x, y)| (x - map_w / 2.0, y - map_h / 2.0))
        .collect();
    let mean_3d = points_3d.iter().sum::<Vector3<f32>>() / n;
    let mean_2d = centered
        .iter()
        .fold((0.0, 0.0), |acc, &(x, y)| (acc.0 + x, acc.1 + y));
    let mean_2d = (mean_2d.0 / n, mean_2d.1 / n);

    let spread_3d = points_3d
        .iter()
        .map(|p| (p.x - mean_3d.x).powi(2) + (p.y - mean_3d.y).powi(2))
        .sum::<f32>()
        .sqrt();
    let spread_2d = centered
        .iter()
        .map(|&(x, y)| (x - mean_2d.0).powi(2) + (y - mean_2d.1).powi(2))
        .sum::<f32>()
        .sqrt();
    if spread_2d <= f32::EPSILON {
        return None;
    }

    let scale = spread_3d / spread_2d;
    Some(Vector3::new(
        scale * mean_2d.0 - mean_3d.x,
        scale * mean_2d.1 - mean_3d.y,
        scale * fx_scaled,
    ))
}
