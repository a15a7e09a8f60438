use anyhow::{bail, Result};
use ndarray::Array4;
use opencv::{
    core::{self, Mat, Rect, Size, Vec3f, CV_32FC3},
    imgproc,
    prelude::*,
};

/// ネットワークの出力ストライド
pub const STRIDE: i32 = 8;

/// デフォルトのネットワーク入力の高さ
pub const DEFAULT_HEIGHT_SIZE: i32 = 256;

/// 画素値の正規化: (v - 128) / 255
const PIXEL_MEAN: f32 = 128.0;
const PIXEL_SCALE: f32 = 1.0 / 255.0;

/// 前処理済みの入力
pub struct NetworkInput {
    /// [1, 3, H, W] の f32 テンソル（BGR）
    pub tensor: Array4<f32>,
    /// 元フレームに対する縮尺
    pub input_scale: f32,
}

/// フレームを時計回りに90度回転（横置きカメラを縦に使う場合）
pub fn rotate_to_vertical(frame: &Mat) -> Result<Mat> {
    let mut rotated = Mat::default();
    core::rotate(frame, &mut rotated, core::ROTATE_90_CLOCKWISE)?;
    Ok(rotated)
}

/// 縮尺後の幅をストライドの倍数に切り詰める
pub fn cropped_width(width: i32) -> i32 {
    width - width % STRIDE
}

/// 入力の高さに合わせた縮尺
pub fn input_scale(frame_height: i32, height_size: i32) -> f32 {
    height_size as f32 / frame_height as f32
}

/// OpenCV Mat をネットワーク入力テンソルに変換
///
/// - 高さが `height_size` になるよう等倍縮小
/// - 幅をストライドの倍数にクロップ（パディングはしない）
/// - (v - 128) / 255 で正規化し [1, 3, H, W] に並べ替え
pub fn preprocess_frame(frame: &Mat, height_size: i32) -> Result<NetworkInput> {
    if frame.empty() {
        bail!("Empty frame");
    }
    let scale = input_scale(frame.rows(), height_size);

    let mut scaled = Mat::default();
    imgproc::resize(
        frame,
        &mut scaled,
        Size::new(0, 0),
        scale as f64,
        scale as f64,
        imgproc::INTER_LINEAR,
    )?;

    let width = cropped_width(scaled.cols());
    let height = scaled.rows();
    if width <= 0 {
        bail!("Frame is too narrow for the network input ({}px)", scaled.cols());
    }
    let cropped = Mat::roi(&scaled, Rect::new(0, 0, width, height))?.try_clone()?;

    let mut float_mat = Mat::default();
    cropped.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for y in 0..height {
        for x in 0..width {
            let pixel = float_mat.at_2d::<Vec3f>(y, x)?;
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (pixel[c] - PIXEL_MEAN) * PIXEL_SCALE;
            }
        }
    }

    Ok(NetworkInput {
        tensor,
        input_scale: scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_cropped_width() {
        assert_eq!(cropped_width(455), 448);
        assert_eq!(cropped_width(448), 448);
        assert_eq!(cropped_width(7), 0);
    }

    #[test]
    fn test_input_scale() {
        assert!((input_scale(512, 256) - 0.5).abs() < 1e-6);
        assert!((input_scale(1080, 256) - 0.237_037).abs() < 1e-5);
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let frame =
            Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::new(128.0, 255.0, 0.0, 0.0)).unwrap();
        let input = preprocess_frame(&frame, 256).unwrap();

        // 640 * 256/480 = 341.33 -> 341 -> 336
        assert_eq!(input.tensor.shape(), &[1, 3, 256, 336]);
        assert!((input.input_scale - 256.0 / 480.0).abs() < 1e-6);
        assert!(input.tensor[[0, 0, 10, 10]].abs() < 1e-6);
        assert!((input.tensor[[0, 1, 10, 10]] - 127.0 / 255.0).abs() < 1e-5);
        assert!((input.tensor[[0, 2, 10, 10]] + 128.0 / 255.0).abs() < 1e-5);
    }

    #[test]
    fn test_rotate_to_vertical_swaps_dimensions() {
        let frame = Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap();
        let rotated = rotate_to_vertical(&frame).unwrap();
        assert_eq!(rotated.rows(), 640);
        assert_eq!(rotated.cols(), 480);
    }

    #[test]
    fn test_preprocess_empty_frame_is_error() {
        assert!(preprocess_frame(&Mat::default(), 256).is_err());
    }
}
