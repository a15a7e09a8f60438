//! 描画色

/// 2D 骨格線 (BGR)
pub const EDGE_COLOR_BGR: (f64, f64, f64) = (255.0, 255.0, 0.0);
/// 2D キーポイント (BGR)
pub const KEYPOINT_COLOR_BGR: (f64, f64, f64) = (0.0, 255.0, 255.0);
/// FPS 表示 (BGR)
pub const FPS_COLOR_BGR: (f64, f64, f64) = (0.0, 0.0, 255.0);

pub const EDGE_THICKNESS: i32 = 4;
pub const KEYPOINT_RADIUS: i32 = 3;

/// 3D キャンバスの床グリッドと軸 (RGB)
pub const AXIS_COLOR: u32 = 0x808080;
/// 3D キャンバスの骨格線 (RGB)
pub const BONE_COLOR: u32 = 0xFFFFFF;
/// 3D キャンバスの背景 (RGB)
pub const BACKGROUND_COLOR: u32 = 0x000000;
