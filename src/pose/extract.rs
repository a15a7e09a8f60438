//! Heatmap / PAF decoding into multi-person 2D poses.
//!
//! Keypoints are peaks of the (upsampled) heatmaps. Candidate limbs are scored
//! by integrating the part affinity field along the segment between two
//! keypoints, then greedily assembled into people.

use anyhow::{Context, Result};
use ndarray::{Array3, ArrayView2, ArrayView3, Axis};
use opencv::{
    core::{Mat, Scalar, Size, CV_32FC1},
    imgproc,
    prelude::*,
};

use super::keypoint::COCO_KEYPOINT_COUNT;

/// ヒートマップ・PAFの拡大率
pub const UPSAMPLE_RATIO: usize = 4;

const HEATMAP_THRESHOLD: f32 = 0.1;
/// この距離未満のピークは同一点として抑制（拡大後ピクセル）
const PEAK_SUPPRESSION_RADIUS: f32 = 6.0;
const PAF_SAMPLE_COUNT: usize = 10;
const MIN_PAF_SCORE: f32 = 0.05;
const MIN_SUCCESS_RATIO: f32 = 0.8;
const MIN_POSE_KEYPOINTS: usize = 3;
const MIN_POSE_MEAN_SCORE: f32 = 0.2;

/// リンク (COCO キーポイントの組)
const LIMB_KEYPOINTS: [(usize, usize); 19] = [
    (1, 2), (1, 5), (2, 3), (3, 4), (5, 6), (6, 7), (1, 8), (8, 9), (9, 10), (1, 11),
    (11, 12), (12, 13), (1, 0), (0, 14), (14, 16), (0, 15), (15, 17), (2, 16), (5, 17),
];

/// 各リンクに対応する PAF チャンネル (x, y)
const LIMB_PAF_CHANNELS: [(usize, usize); 19] = [
    (12, 13), (20, 21), (14, 15), (16, 17), (22, 23), (24, 25), (0, 1), (2, 3), (4, 5),
    (6, 7), (8, 9), (10, 11), (28, 29), (30, 31), (34, 35), (32, 33), (36, 37), (18, 19), (26, 27),
];

/// 耳と肩を結ぶリンク。既存の姿勢を補完するだけで新しい姿勢は作らない。
const EAR_SHOULDER_LIMBS: [usize; 2] = [17, 18];

/// ヒートマップのピーク
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub x: f32,
    pub y: f32,
    pub score: f32,
    /// 全ピーク通し番号
    pub id: usize,
}

/// ネットワーク出力から抽出した1人分の2D姿勢（COCO 順、特徴マップ座標）
#[derive(Debug, Clone, PartialEq)]
pub struct RawPose {
    /// (x, y, confidence)
    pub keypoints: [Option<(f32, f32, f32)>; COCO_KEYPOINT_COUNT],
    pub score: f32,
}

#[derive(Debug, Clone)]
struct PoseEntry {
    keypoints: [Option<usize>; COCO_KEYPOINT_COUNT],
    score: f32,
    count: usize,
}

impl PoseEntry {
    fn empty() -> Self {
        Self {
            keypoints: [None; COCO_KEYPOINT_COUNT],
            score: 0.0,
            count: 0,
        }
    }
}

/// ヒートマップ [>=18, h, w] と PAF [38, h, w] から複数人の2D姿勢を抽出
///
/// 座標は入力マップ（特徴マップ）の単位で返す。
pub fn extract_poses(heatmaps: ArrayView3<f32>, pafs: ArrayView3<f32>, upsample_ratio: usize) -> Result<Vec<RawPose>> {
    let heatmaps = upsample(heatmaps.slice(ndarray::s![0..COCO_KEYPOINT_COUNT, .., ..]), upsample_ratio)?;
    let pafs = upsample(pafs, upsample_ratio)?;

    let mut peaks_by_type = Vec::with_capacity(COCO_KEYPOINT_COUNT);
    let mut total = 0;
    for heatmap in heatmaps.axis_iter(Axis(0)) {
        let peaks = find_peaks(heatmap, total);
        total += peaks.len();
        peaks_by_type.push(peaks);
    }
    let all_peaks: Vec<Peak> = peaks_by_type.iter().flatten().copied().collect();

    let entries = group_keypoints(&peaks_by_type, &all_peaks, pafs.view());

    let ratio = upsample_ratio.max(1) as f32;
    let poses = entries
        .iter()
        .map(|entry| RawPose {
            keypoints: std::array::from_fn(|k| {
                entry.keypoints[k].map(|id| {
                    let peak = &all_peaks[id];
                    (peak.x / ratio, peak.y / ratio, peak.score)
                })
            }),
            score: entry.score,
        })
        .collect();
    Ok(poses)
}

/// 各チャンネルを OpenCV のバイキュービック補間で拡大
pub fn upsample(maps: ArrayView3<f32>, ratio: usize) -> Result<Array3<f32>> {
    if ratio <= 1 {
        return Ok(maps.to_owned());
    }
    let (channels, h, w) = maps.dim();
    let (out_h, out_w) = (h * ratio, w * ratio);

    let mut out = Array3::<f32>::zeros((channels, out_h, out_w));
    for (src, mut dst) in maps.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        let mut mat = Mat::new_rows_cols_with_default(h as i32, w as i32, CV_32FC1, Scalar::all(0.0))?;
        for (d, s) in mat.data_typed_mut::<f32>()?.iter_mut().zip(src.iter()) {
            *d = *s;
        }

        let mut resized = Mat::default();
        imgproc::resize(
            &mat,
            &mut resized,
            Size::default(),
            ratio as f64,
            ratio as f64,
            imgproc::INTER_CUBIC,
        )?;
        let resized = ArrayView2::from_shape((out_h, out_w), resized.data_typed::<f32>()?)
            .context("Unexpected upsampled map size")?;
        dst.assign(&resized);
    }
    Ok(out)
}

/// 4近傍より大きい点をピークとして検出し、近接ピークを抑制
pub fn find_peaks(heatmap: ArrayView2<f32>, first_id: usize) -> Vec<Peak> {
    let (h, w) = heatmap.dim();
    let value = |y: isize, x: isize| -> f32 {
        if y < 0 || x < 0 || y >= h as isize || x >= w as isize {
            return 0.0;
        }
        let v = heatmap[[y as usize, x as usize]];
        if v < HEATMAP_THRESHOLD { 0.0 } else { v }
    };

    let mut candidates = Vec::new();
    for y in 0..h as isize {
        for x in 0..w as isize {
            let center = value(y, x);
            if center > value(y, x - 1)
                && center > value(y, x + 1)
                && center > value(y - 1, x)
                && center > value(y + 1, x)
            {
                candidates.push((x, y, center));
            }
        }
    }
    // x 座標順（安定ソート）
    candidates.sort_by_key(|&(x, _, _)| x);

    let mut suppressed = vec![false; candidates.len()];
    let mut peaks = Vec::new();
    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        let (xi, yi, score) = candidates[i];
        for j in i + 1..candidates.len() {
            let (xj, yj, _) = candidates[j];
            let distance = (((xi - xj).pow(2) + (yi - yj).pow(2)) as f32).sqrt();
            if distance < PEAK_SUPPRESSION_RADIUS {
                suppressed[j] = true;
            }
        }
        peaks.push(Peak {
            x: xi as f32,
            y: yi as f32,
            score,
            id: first_id + peaks.len(),
        });
    }
    peaks
}

/// PAF に沿った2点間の接続スコア。接続不可なら None。
fn connection_score(a: &Peak, b: &Peak, paf_x: ArrayView2<f32>, paf_y: ArrayView2<f32>) -> Option<f32> {
    let (h, w) = paf_x.dim();
    let (vx, vy) = (b.x - a.x, b.y - a.y);
    let norm = (vx * vx + vy * vy).sqrt();
    if norm == 0.0 {
        return None;
    }
    let (ux, uy) = (vx / norm, vy / norm);

    let mut passed_score = 0.0;
    let mut passed_count = 0;
    for i in 0..PAF_SAMPLE_COUNT {
        let t = i as f32 / (PAF_SAMPLE_COUNT - 1) as f32;
        let px = ((a.x + vx * t).round() as usize).min(w - 1);
        let py = ((a.y + vy * t).round() as usize).min(h - 1);
        let score = ux * paf_x[[py, px]] + uy * paf_y[[py, px]];
        if score > MIN_PAF_SCORE {
            passed_score += score;
            passed_count += 1;
        }
    }

    let success_ratio = passed_count as f32 / PAF_SAMPLE_COUNT as f32;
    let mut ratio = if passed_count > 0 { passed_score / passed_count as f32 } else { 0.0 };
    // 画像の半分より長いリンクは減点
    ratio += ((h / 2) as f32 / norm - 1.0).min(0.0);

    (ratio > 0.0 && success_ratio > MIN_SUCCESS_RATIO).then_some(ratio)
}

fn group_keypoints(peaks_by_type: &[Vec<Peak>], all_peaks: &[Peak], pafs: ArrayView3<f32>) -> Vec<PoseEntry> {
    let mut entries: Vec<PoseEntry> = Vec::new();

    for (limb, &(kpt_a, kpt_b)) in LIMB_KEYPOINTS.iter().enumerate() {
        let candidates_a = &peaks_by_type[kpt_a];
        let candidates_b = &peaks_by_type[kpt_b];

        if candidates_a.is_empty() && candidates_b.is_empty() {
            continue;
        }
        if candidates_a.is_empty() || candidates_b.is_empty() {
            // 片側しか無いリンク: どの姿勢にも属さない点だけ新しい姿勢にする
            let (kpt, candidates) = if candidates_a.is_empty() { (kpt_b, candidates_b) } else { (kpt_a, candidates_a) };
            for peak in candidates {
                if !entries.iter().any(|e| e.keypoints[kpt] == Some(peak.id)) {
                    let mut entry = PoseEntry::empty();
                    entry.keypoints[kpt] = Some(peak.id);
                    entry.count = 1;
                    entry.score = peak.score;
                    entries.push(entry);
                }
            }
            continue;
        }

        let (paf_cx, paf_cy) = LIMB_PAF_CHANNELS[limb];
        let paf_x = pafs.index_axis(Axis(0), paf_cx);
        let paf_y = pafs.index_axis(Axis(0), paf_cy);

        let mut scored = Vec::new();
        for (i, a) in candidates_a.iter().enumerate() {
            for (j, b) in candidates_b.iter().enumerate() {
                if let Some(score) = connection_score(a, b, paf_x, paf_y) {
                    scored.push((i, j, score));
                }
            }
        }
        scored.sort_by(|l, r| r.2.total_cmp(&l.2));

        let max_connections = candidates_a.len().min(candidates_b.len());
        let mut used_a = vec![false; candidates_a.len()];
        let mut used_b = vec![false; candidates_b.len()];
        let mut connections = Vec::new();
        for (i, j, score) in scored {
            if connections.len() == max_connections {
                break;
            }
            if !used_a[i] && !used_b[j] {
                connections.push((candidates_a[i].id, candidates_b[j].id, score));
                used_a[i] = true;
                used_b[j] = true;
            }
        }
        if connections.is_empty() {
            continue;
        }

        if limb == 0 {
            entries = connections
                .iter()
                .map(|&(id_a, id_b, score)| {
                    let mut entry = PoseEntry::empty();
                    entry.keypoints[kpt_a] = Some(id_a);
                    entry.keypoints[kpt_b] = Some(id_b);
                    entry.count = 2;
                    entry.score = all_peaks[id_a].score + all_peaks[id_b].score + score;
                    entry
                })
                .collect();
        } else if EAR_SHOULDER_LIMBS.contains(&limb) {
            for &(id_a, id_b, _) in &connections {
                for entry in entries.iter_mut() {
                    if entry.keypoints[kpt_a] == Some(id_a) && entry.keypoints[kpt_b].is_none() {
                        entry.keypoints[kpt_b] = Some(id_b);
                    } else if entry.keypoints[kpt_b] == Some(id_b) && entry.keypoints[kpt_a].is_none() {
                        entry.keypoints[kpt_a] = Some(id_a);
                    }
                }
            }
        } else {
            for &(id_a, id_b, score) in &connections {
                let mut attached = false;
                for entry in entries.iter_mut() {
                    if entry.keypoints[kpt_a] == Some(id_a) {
                        entry.keypoints[kpt_b] = Some(id_b);
                        entry.count += 1;
                        entry.score += all_peaks[id_b].score + score;
                        attached = true;
                    }
                }
                if !attached {
                    let mut entry = PoseEntry::empty();
                    entry.keypoints[kpt_a] = Some(id_a);
                    entry.keypoints[kpt_b] = Some(id_b);
                    entry.count = 2;
                    entry.score = all_peaks[id_a].score + all_peaks[id_b].score + score;
                    entries.push(entry);
                }
            }
        }
    }

    entries
        .into_iter()
        .filter(|e| e.count >= MIN_POSE_KEYPOINTS && e.score / e.count as f32 >= MIN_POSE_MEAN_SCORE)
        .collect()
}
