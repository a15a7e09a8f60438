use crate::pose::{JointIndex, Pose2d};
use crate::tracker::one_euro::TranslationFilter;

/// 同一人物とみなすのに必要な類似キーポイント数
const MIN_SIMILAR_KEYPOINTS: usize = 3;
/// キーポイント単位の類似度閾値
const KEYPOINT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// 関節ごとの OKS 標準偏差（Panoptic 順）
const KEYPOINT_SIGMAS: [f32; JointIndex::COUNT] = [
    0.079, 0.026, 0.107, 0.079, 0.072, 0.062, 0.107, 0.087, 0.089,
    0.079, 0.072, 0.062, 0.107, 0.087, 0.089, 0.025, 0.025, 0.035, 0.035,
];

/// フレーム間で追跡される人物
#[derive(Debug, Clone)]
pub struct TrackedPose {
    pub id: u32,
    pub pose: Pose2d,
    pub filter: TranslationFilter,
}

/// 前フレームの人物IDと並進フィルタを現フレームへ引き継ぐ
#[derive(Debug, Default)]
pub struct PoseTracker {
    previous: Vec<TrackedPose>,
    next_id: u32,
}

/// 2つの姿勢で位置が近いキーポイントの数（OKS 類似度が閾値を超えるもの）
pub fn similar_keypoints(a: &Pose2d, b: &Pose2d) -> usize {
    let area = |p: &Pose2d| p.bounding_box().map(|(_, _, w, h)| w * h).unwrap_or(0.0);
    let area = area(a).max(area(b));

    (0..JointIndex::COUNT)
        .filter(|&k| match (&a.keypoints[k], &b.keypoints[k]) {
            (Some(ka), Some(kb)) => {
                let distance = (ka.x - kb.x).powi(2) + (ka.y - kb.y).powi(2);
                let variance = (KEYPOINT_SIGMAS[k] * 2.0).powi(2);
                let similarity = (-distance / (2.0 * (area + f32::EPSILON) * variance)).exp();
                similarity > KEYPOINT_SIMILARITY_THRESHOLD
            }
            _ => false,
        })
        .count()
}

impl PoseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現フレームの姿勢にIDを割り当てる（入力と同じ順序で返す）
    ///
    /// 信頼度の高い姿勢から順に、まだ使われていない前フレームの姿勢と照合する。
    /// 一致したものはIDとフィルタを引き継ぎ、それ以外は新しいIDを得る。
    pub fn update(&mut self, poses: &[Pose2d]) -> &mut [TrackedPose] {
        let mut order: Vec<usize> = (0..poses.len()).collect();
        order.sort_by(|&l, &r| poses[r].score.total_cmp(&poses[l].score));

        let mut previous: Vec<Option<TrackedPose>> = std::mem::take(&mut self.previous)
            .into_iter()
            .map(Some)
            .collect();
        let mut current: Vec<Option<TrackedPose>> = vec![None; poses.len()];

        for index in order {
            let pose = &poses[index];
            let mut best: Option<(usize, usize)> = None;
            for (prev_index, prev) in previous.iter().enumerate() {
                let Some(prev) = prev else { continue };
                let similar = similar_keypoints(pose, &prev.pose);
                if similar > best.map_or(0, |(_, s)| s) {
                    best = Some((prev_index, similar));
                }
            }

            let matched = match best {
                Some((prev_index, similar)) if similar >= MIN_SIMILAR_KEYPOINTS => previous[prev_index].take(),
                _ => None,
            };
            let tracked = match matched {
                Some(prev) => TrackedPose {
                    id: prev.id,
                    pose: pose.clone(),
                    filter: prev.filter,
                },
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    TrackedPose {
                        id,
                        pose: pose.clone(),
                        filter: TranslationFilter::new(),
                    }
                }
            };
            current[index] = Some(tracked);
        }

        self.previous = current.into_iter().flatten().collect();
        &mut self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;

    fn pose_at(offset_x: f32, score: f32) -> Pose2d {
        let mut keypoints = [None; JointIndex::COUNT];
        for (i, k) in keypoints.iter_mut().enumerate().take(6) {
            *k = Some(Keypoint::new(offset_x + (i % 3) as f32 * 40.0, (i / 3) as f32 * 80.0, 0.9));
        }
        Pose2d::new(keypoints, score)
    }

    #[test]
    fn test_similar_keypoints_identical() {
        let pose = pose_at(100.0, 1.0);
        assert_eq!(similar_keypoints(&pose, &pose), 6);
    }

    #[test]
    fn test_similar_keypoints_far_apart() {
        assert_eq!(similar_keypoints(&pose_at(0.0, 1.0), &pose_at(500.0, 1.0)), 0);
    }

    #[test]
    fn test_ids_are_kept_for_nearby_poses() {
        let mut tracker = PoseTracker::new();
        let first: Vec<u32> = tracker
            .update(&[pose_at(0.0, 1.0), pose_at(500.0, 2.0)])
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(first.len(), 2);
        assert_ne!(first[0], first[1]);

        // 少しだけ動いた同じ2人（順序を入れ替え）
        let second: Vec<u32> = tracker
            .update(&[pose_at(502.0, 2.0), pose_at(1.0, 1.0)])
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(second, vec![first[1], first[0]]);
    }

    #[test]
    fn test_new_person_gets_new_id() {
        let mut tracker = PoseTracker::new();
        let first = tracker.update(&[pose_at(0.0, 1.0)])[0].id;
        let second = tracker.update(&[pose_at(900.0, 1.0)])[0].id;
        assert_ne!(first, second);
    }

    #[test]
    fn test_filter_is_inherited() {
        let mut tracker = PoseTracker::new();
        let tracked = tracker.update(&[pose_at(0.0, 1.0)]);
        let t = tracked[0].filter.apply(nalgebra::Vector3::new(0.0, 0.0, 100.0));
        assert_eq!(t.z, 100.0);

        let tracked = tracker.update(&[pose_at(1.0, 1.0)]);
        // 引き継いだフィルタは平滑化する（新規なら素通し）
        let t = tracked[0].filter.apply(nalgebra::Vector3::new(0.0, 0.0, 200.0));
        assert!(t.z < 200.0 && t.z > 100.0, "z = {}", t.z);
    }

    #[test]
    fn test_person_who_left_is_not_matched_again() {
        let mut tracker = PoseTracker::new();
        let first = tracker.update(&[pose_at(0.0, 1.0)])[0].id;
        assert!(tracker.update(&[]).is_empty());
        let second = tracker.update(&[pose_at(0.0, 1.0)])[0].id;
        assert_ne!(first, second);
    }
}
