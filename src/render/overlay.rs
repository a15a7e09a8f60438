use anyhow::Result;
use opencv::{
    core::{Mat, Point, Scalar},
    imgproc,
};
use std::time::Duration;

use super::skeleton::{
    EDGE_COLOR_BGR, EDGE_THICKNESS, FPS_COLOR_BGR, KEYPOINT_COLOR_BGR, KEYPOINT_RADIUS,
};
use crate::geometry::SKELETON_EDGES;
use crate::pose::Pose2d;

/// FPS 表示の位置
const FPS_ORIGIN: (i32, i32) = (40, 80);

fn bgr((b, g, r): (f64, f64, f64)) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

/// フレーム上に2D骨格を描く（信頼度が正の関節のみ）
pub fn draw_poses(frame: &mut Mat, poses: &[Pose2d]) -> Result<()> {
    for pose in poses {
        let found = |j: usize| pose.keypoints[j].filter(|k| k.confidence > 0.0);

        for &(a, b) in &SKELETON_EDGES {
            if let (Some(ka), Some(kb)) = (found(a), found(b)) {
                let (xa, ya) = ka.to_pixel();
                let (xb, yb) = kb.to_pixel();
                imgproc::line(
                    frame,
                    Point::new(xa, ya),
                    Point::new(xb, yb),
                    bgr(EDGE_COLOR_BGR),
                    EDGE_THICKNESS,
                    imgproc::LINE_AA,
                    0,
                )?;
            }
        }
        for kp in pose.keypoints.iter().flatten() {
            let (x, y) = kp.to_pixel();
            imgproc::circle(
                frame,
                Point::new(x, y),
                KEYPOINT_RADIUS,
                bgr(KEYPOINT_COLOR_BGR),
                imgproc::FILLED,
                imgproc::LINE_AA,
                0,
            )?;
        }
    }
    Ok(())
}

/// フレーム時間の指数移動平均
#[derive(Debug, Default)]
pub struct FpsMeter {
    mean_secs: f64,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        self.mean_secs = if self.mean_secs == 0.0 {
            secs
        } else {
            self.mean_secs * 0.95 + secs * 0.05
        };
    }

    /// 小数1桁に切り捨てた FPS
    pub fn fps(&self) -> f64 {
        if self.mean_secs <= 0.0 {
            return 0.0;
        }
        (1.0 / self.mean_secs * 10.0).trunc() / 10.0
    }

    pub fn label(&self) -> String {
        format!("FPS: {:?}", self.fps())
    }

    pub fn draw(&self, frame: &mut Mat) -> Result<()> {
        imgproc::put_text(
            frame,
            &self.label(),
            Point::new(FPS_ORIGIN.0, FPS_ORIGIN.1),
            imgproc::FONT_HERSHEY_COMPLEX,
            1.0,
            bgr(FPS_COLOR_BGR),
            1,
            imgproc::LINE_8,
            false,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{JointIndex, Keypoint};
    use opencv::core::{Vec3b, CV_8UC3};
    use opencv::prelude::*;

    fn blank() -> Mat {
        Mat::new_rows_cols_with_default(100, 100, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    #[test]
    fn test_fps_meter_moving_average() {
        let mut meter = FpsMeter::new();
        assert_eq!(meter.fps(), 0.0);

        meter.update(Duration::from_millis(100));
        assert_eq!(meter.fps(), 10.0);
        assert_eq!(meter.label(), "FPS: 10.0");

        // 0.1 * 0.95 + 0.05 * 0.05 = 0.0975 -> 10.25...
        meter.update(Duration::from_millis(50));
        assert_eq!(meter.fps(), 10.2);
    }

    #[test]
    fn test_draw_poses_marks_found_keypoints_and_edges() {
        let mut frame = blank();
        let mut keypoints = [None; JointIndex::COUNT];
        keypoints[JointIndex::Neck as usize] = Some(Keypoint::new(20.0, 50.0, 0.9));
        keypoints[JointIndex::Nose as usize] = Some(Keypoint::new(80.0, 50.0, 0.8));
        keypoints[JointIndex::LeftShoulder as usize] = Some(Keypoint::new(20.0, 90.0, 0.5));
        draw_poses(&mut frame, &[Pose2d::new(keypoints, 2.0)]).unwrap();

        // 首と鼻の間の骨格線
        assert_eq!(*frame.at_2d::<Vec3b>(50, 50).unwrap(), Vec3b::from([255, 255, 0]));
        // 鼻の点
        assert_eq!(*frame.at_2d::<Vec3b>(50, 80).unwrap(), Vec3b::from([0, 255, 255]));
        // 何もないところ
        assert_eq!(*frame.at_2d::<Vec3b>(5, 95).unwrap(), Vec3b::from([0, 0, 0]));
    }

    #[test]
    fn test_draw_fps_label() {
        let mut frame = Mat::new_rows_cols_with_default(120, 300, CV_8UC3, Scalar::all(0.0)).unwrap();
        let mut meter = FpsMeter::new();
        meter.update(Duration::from_millis(40));
        meter.draw(&mut frame).unwrap();
        let red = (0..120)
            .flat_map(|y| (0..300).map(move |x| (y, x)))
            .filter(|&(y, x)| frame.at_2d::<Vec3b>(y, x).map(|p| p[2] > 0).unwrap_or(false))
            .count();
        assert!(red > 0);
    }
}
