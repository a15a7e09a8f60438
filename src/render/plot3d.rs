use nalgebra::{Matrix3x2, Vector2, Vector3};
use std::f32::consts::PI;

use super::canvas::Canvas;
use super::skeleton::{AXIS_COLOR, BONE_COLOR};
use crate::geometry::SKELETON_EDGES;
use crate::pose::Pose3d;

const AXIS_LENGTH: f32 = 200.0;
const GRID_STEP: f32 = 20.0;
/// マウス移動量 → 回転角の換算（このピクセル数で1周）
const DRAG_SCALE: f32 = 800.0;

const INITIAL_THETA: f32 = PI / 4.0;
const INITIAL_PHI: f32 = -PI / 6.0;

/// 3D 骨格の正射影ビュー
///
/// theta は鉛直軸まわり、phi は仰角。左ドラッグで回す。
pub struct Plotter3d {
    origin: Vector2<f32>,
    scale: f32,
    theta: f32,
    phi: f32,
    axes: Vec<[Vector3<f32>; 2]>,
    drag_from: Option<(f32, f32)>,
}

impl Plotter3d {
    pub fn new(canvas_width: usize, canvas_height: usize) -> Self {
        Self {
            origin: Vector2::new(canvas_width as f32 * 0.5, canvas_height as f32 * 0.5),
            scale: 1.0,
            theta: INITIAL_THETA,
            phi: INITIAL_PHI,
            axes: grid_axes(),
            drag_from: None,
        }
    }

    /// キャンバスを消して、床グリッドと全員の骨格を描く
    pub fn plot(&self, canvas: &mut Canvas, poses: &[Pose3d]) {
        canvas.clear();
        let rotation = rotation(self.theta, self.phi);

        for [a, b] in &self.axes {
            canvas.draw_line(self.project(a, &rotation), self.project(b, &rotation), AXIS_COLOR);
        }
        for pose in poses {
            for &(a, b) in &SKELETON_EDGES {
                canvas.draw_line(
                    self.project(&pose.joints[a].position, &rotation),
                    self.project(&pose.joints[b].position, &rotation),
                    BONE_COLOR,
                );
            }
        }
    }

    /// キャンバス上のピクセル（切り捨て）
    pub fn project(&self, point: &Vector3<f32>, rotation: &Matrix3x2<f32>) -> (i32, i32) {
        let p = (point.transpose() * rotation).transpose() * self.scale + self.origin;
        (p.x as i32, p.y as i32)
    }

    /// 左ボタンの状態とカーソル位置から回転を更新
    pub fn handle_mouse(&mut self, position: Option<(f32, f32)>, left_down: bool) {
        match (left_down, position, self.drag_from) {
            (true, Some(pos), None) => self.drag_from = Some(pos),
            (true, Some((x, y)), Some((px, py))) => {
                self.theta += (x - px) / DRAG_SCALE * 2.0 * PI;
                self.phi -= (y - py) / DRAG_SCALE * 2.0 * PI * 2.0;
                self.phi = self.phi.clamp(-PI / 2.0, PI / 2.0);
                self.drag_from = Some((x, y));
            }
            (false, _, _) => self.drag_from = None,
            _ => {}
        }
    }
}

/// 3D → 2D の射影行列（行ベクトルに右から掛ける）
fn rotation(theta: f32, phi: f32) -> Matrix3x2<f32> {
    let (sin_t, cos_t) = theta.sin_cos();
    let (sin_p, cos_p) = phi.sin_cos();
    Matrix3x2::new(
        cos_t, sin_t * sin_p,
        -sin_t, cos_t * sin_p,
        0.0, -cos_p,
    )
}

/// 3本の軸と 20 刻みの床グリッド
fn grid_axes() -> Vec<[Vector3<f32>; 2]> {
    let half = AXIS_LENGTH / 2.0;
    let mut axes = vec![
        [Vector3::new(-half, -half, 0.0), Vector3::new(half, -half, 0.0)],
        [Vector3::new(-half, -half, 0.0), Vector3::new(-half, half, 0.0)],
        [Vector3::new(-half, -half, 0.0), Vector3::new(-half, -half, AXIS_LENGTH)],
    ];
    let steps = (AXIS_LENGTH / GRID_STEP) as usize;
    for i in 0..=steps {
        let offset = -half + i as f32 * GRID_STEP;
        axes.push([Vector3::new(-half, offset, 0.0), Vector3::new(half, offset, 0.0)]);
        axes.push([Vector3::new(offset, -half, 0.0), Vector3::new(offset, half, 0.0)]);
    }
    axes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Joint3d, JointIndex};

    #[test]
    fn test_grid_axes_count() {
        // 3本の軸 + (200 / 20 + 1) * 2 本のグリッド線
        assert_eq!(grid_axes().len(), 3 + 11 * 2);
    }

    #[test]
    fn test_origin_projects_to_canvas_centre() {
        let plotter = Plotter3d::new(1280, 720);
        let rotation = rotation(plotter.theta, plotter.phi);
        assert_eq!(plotter.project(&Vector3::zeros(), &rotation), (640, 360));
    }

    #[test]
    fn test_projection_at_zero_angles() {
        let mut plotter = Plotter3d::new(100, 100);
        plotter.theta = 0.0;
        plotter.phi = 0.0;
        let rotation = rotation(plotter.theta, plotter.phi);
        // x はそのまま右へ、z は上へ（画面 y が減る）
        assert_eq!(plotter.project(&Vector3::new(10.0, 0.0, 0.0), &rotation), (60, 50));
        assert_eq!(plotter.project(&Vector3::new(0.0, 0.0, 10.0), &rotation), (50, 40));
        // y は奥行きなので画面上は動かない
        assert_eq!(plotter.project(&Vector3::new(0.0, 10.0, 0.0), &rotation), (50, 50));
    }

    #[test]
    fn test_mouse_drag_rotates_and_clamps() {
        let mut plotter = Plotter3d::new(1280, 720);
        let theta0 = plotter.theta;

        plotter.handle_mouse(Some((100.0, 100.0)), true);
        plotter.handle_mouse(Some((300.0, 100.0)), true);
        assert!((plotter.theta - (theta0 + 0.25 * 2.0 * PI)).abs() < 1e-5);

        plotter.handle_mouse(Some((300.0, 2000.0)), true);
        assert_eq!(plotter.phi, -PI / 2.0);

        // ボタンを離したら移動しても回らない
        plotter.handle_mouse(Some((300.0, 2000.0)), false);
        let before = (plotter.theta, plotter.phi);
        plotter.handle_mouse(Some((900.0, 100.0)), false);
        assert_eq!((plotter.theta, plotter.phi), before);
    }

    #[test]
    fn test_drag_without_motion_keeps_angles() {
        let mut plotter = Plotter3d::new(1280, 720);
        let before = (plotter.theta, plotter.phi);
        plotter.handle_mouse(Some((50.0, 50.0)), true);
        plotter.handle_mouse(Some((50.0, 50.0)), true);
        assert_eq!((plotter.theta, plotter.phi), before);
    }

    #[test]
    fn test_plot_draws_bones() {
        let plotter = Plotter3d::new(200, 200);
        let mut canvas = Canvas::new(200, 200);
        let mut joints = [Joint3d::new(Vector3::zeros(), 1.0); JointIndex::COUNT];
        joints[JointIndex::Nose as usize].position = Vector3::new(0.0, 0.0, 50.0);
        plotter.plot(&mut canvas, &[Pose3d::new(joints)]);

        let rotation = rotation(plotter.theta, plotter.phi);
        let (x, y) = plotter.project(&Vector3::new(0.0, 0.0, 50.0), &rotation);
        assert_eq!(canvas.pixel(x as usize, y as usize), Some(BONE_COLOR));
    }
}
