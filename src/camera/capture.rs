use anyhow::{bail, Context, Result};
use opencv::{
    core::Mat,
    imgcodecs,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::CameraConfig;

/// 動画ファイル・Webカメラに要求する解像度
const VIDEO_REQUEST_WIDTH: f64 = 1920.0;
const VIDEO_REQUEST_HEIGHT: f64 = 1080.0;

/// フレーム供給源
///
/// `next_frame` は BGR の Mat を返し、ストリーム終端で `None` を返す。
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Mat>>;

    /// 動画のように連続再生するソースか（静止画は false）
    fn is_live(&self) -> bool;
}

/// 起動時に選ぶ入力の種類
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    Images(Vec<PathBuf>),
    /// 動画ファイルパスまたはカメラ番号
    Video(String),
    DepthCamera,
}

/// 入力の種類に応じてフレーム供給源を開く
pub fn open_source(kind: &SourceKind, camera: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match kind {
        SourceKind::Images(paths) => Box::new(ImageSource::new(paths.clone())),
        SourceKind::Video(name) => Box::new(VideoSource::open(name)?),
        SourceKind::DepthCamera => Box::new(DepthCameraSource::open(camera)?),
    };
    Ok(source)
}

/// 静止画を順番に読み込む
pub struct ImageSource {
    paths: Vec<PathBuf>,
    index: usize,
}

impl ImageSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths, index: 0 }
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let Some(path) = self.paths.get(self.index) else {
            return Ok(None);
        };
        let name = path.to_string_lossy();
        let image = imgcodecs::imread(&name, imgcodecs::IMREAD_COLOR)
            .with_context(|| format!("Image {} cannot be read", name))?;
        if image.empty() {
            bail!("Image {} cannot be read", name);
        }
        self.index += 1;
        Ok(Some(image))
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// 動画ファイルまたはWebカメラ
pub struct VideoSource {
    capture: VideoCapture,
}

/// 整数として解釈できる場合はカメラ番号
pub fn parse_camera_index(name: &str) -> Option<i32> {
    name.trim().parse::<i32>().ok()
}

impl VideoSource {
    pub fn open(name: &str) -> Result<Self> {
        let api = VideoCaptureAPIs::CAP_ANY as i32;
        let mut capture = match parse_camera_index(name) {
            Some(index) => VideoCapture::new(index, api),
            None => VideoCapture::from_file(name, api),
        }
        .with_context(|| format!("Video {} cannot be opened", name))?;
        if !capture.is_opened()? {
            bail!("Video {} cannot be opened", name);
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, VIDEO_REQUEST_WIDTH)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, VIDEO_REQUEST_HEIGHT)?;

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)?;
        info!("Video {} opened: {}x{}", name, width, height);

        Ok(Self { capture })
    }
}

impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let was_read = self.capture.read(&mut frame).context("Failed to read frame")?;
        if !was_read || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    fn is_live(&self) -> bool {
        true
    }
}

/// Intel 深度カメラ（OpenCV Intel Perceptual Computing バックエンド経由）
///
/// カラーと深度のジェネレータを同時に有効にし、毎回新しいフレームセットを取得する。
pub struct DepthCameraSource {
    capture: VideoCapture,
}

impl DepthCameraSource {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let mut capture = VideoCapture::new(0, videoio::CAP_INTELPERC)
            .context("Failed to open depth camera")?;
        if !capture.is_opened()? {
            bail!("Depth camera is not available");
        }

        let requested = [
            ("width", videoio::CAP_PROP_FRAME_WIDTH, config.width as f64),
            ("height", videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64),
            ("fps", videoio::CAP_PROP_FPS, config.fps as f64),
        ];
        let generators = [
            ("color", videoio::CAP_INTELPERC_IMAGE_GENERATOR),
            ("depth", videoio::CAP_INTELPERC_DEPTH_GENERATOR),
        ];
        for (stream, generator) in generators {
            for (name, property, value) in requested {
                let accepted = capture.set(generator + property, value)?;
                let actual = capture.get(generator + property)?;
                if let Some(message) = property_mismatch(name, value, accepted, actual) {
                    warn!("Depth camera {} stream: {}", stream, message);
                }
            }
        }

        // 実際に使われる値（要求が通らなかった場合はデバイス既定値）
        let image = videoio::CAP_INTELPERC_IMAGE_GENERATOR;
        info!(
            "Depth camera started: {}x{} @ {}fps",
            capture.get(image + videoio::CAP_PROP_FRAME_WIDTH)?,
            capture.get(image + videoio::CAP_PROP_FRAME_HEIGHT)?,
            capture.get(image + videoio::CAP_PROP_FPS)?,
        );

        Ok(Self { capture })
    }

    /// 次のフレームセットを取得してカラー画像と深度マップを返す
    pub fn next_frame_set(&mut self) -> Result<Option<(Mat, Mat)>> {
        if !self.capture.grab().context("Failed to grab frame set")? {
            return Ok(None);
        }
        let mut color = Mat::default();
        let mut depth = Mat::default();
        self.capture
            .retrieve(&mut color, videoio::CAP_INTELPERC_IMAGE)
            .context("Failed to retrieve color frame")?;
        self.capture
            .retrieve(&mut depth, videoio::CAP_INTELPERC_DEPTH_MAP)
            .context("Failed to retrieve depth frame")?;
        if color.empty() {
            return Ok(None);
        }
        Ok(Some((color, depth)))
    }
}

/// 設定したプロパティが反映されていなければその説明を返す
fn property_mismatch(name: &str, requested: f64, accepted: bool, actual: f64) -> Option<String> {
    if (actual - requested).abs() < 0.5 {
        return None;
    }
    Some(if accepted {
        format!("{} is {} instead of {}", name, actual, requested)
    } else {
        format!("{} = {} is not supported, using {}", name, requested, actual)
    })
}

impl FrameSource for DepthCameraSource {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        Ok(self.next_frame_set()?.map(|(color, _)| color))
    }

    fn is_live(&self) -> bool {
        true
    }
}

impl Drop for DepthCameraSource {
    fn drop(&mut self) {
        // 停止失敗は無視する
        let _ = self.capture.release();
    }
}
