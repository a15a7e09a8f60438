//! 深度カメラのカラー映像と深度マップ（JET カラーマップ）を AVI に録画する。
//! q または Esc で終了。

use anyhow::{bail, Context, Result};
use opencv::core::{self, Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::VideoWriter;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use pose3d_stream::camera::DepthCameraSource;
use pose3d_stream::config::{Config, DEFAULT_CONFIG_PATH};
use pose3d_stream::playback::Input;
use pose3d_stream::render::{Key, ViewWindow};

const OUTPUT_DIR: &str = "temp";
const COLOR_FILE: &str = "V00P00A00C00_rgb.avi";
const DEPTH_FILE: &str = "V00P00A00C00_depth.avi";
/// 16bit 深度（mm）を 8bit に落とす係数
const DEPTH_ALPHA: f64 = 0.03;

fn open_writer(path: &Path, fps: f64, size: Size) -> Result<VideoWriter> {
    let fourcc = VideoWriter::fourcc('X', 'V', 'I', 'D')?;
    let name = path.to_string_lossy();
    let writer = VideoWriter::new(&name, fourcc, fps, size, true)
        .with_context(|| format!("Failed to create {}", name))?;
    if !writer.is_opened()? {
        bail!("Failed to open {} for writing", name);
    }
    Ok(writer)
}

/// 深度マップを JET カラーマップの BGR 画像に変換
fn colorize_depth(depth: &Mat) -> Result<Mat> {
    let mut scaled = Mat::default();
    core::convert_scale_abs(depth, &mut scaled, DEPTH_ALPHA, 0.0)?;
    let mut colored = Mat::default();
    imgproc::apply_color_map(&scaled, &mut colored, imgproc::COLORMAP_JET)?;
    Ok(colored)
}

/// 最初に書き込むフレームの大きさで開く AVI 出力
struct Recording {
    path: PathBuf,
    fps: f64,
    writer: Option<VideoWriter>,
}

impl Recording {
    fn new(path: PathBuf, fps: f64) -> Self {
        Self { path, fps, writer: None }
    }

    fn write(&mut self, frame: &Mat) -> Result<()> {
        if self.writer.is_none() {
            let size = frame.size()?;
            info!("Recording {} at {}x{}", self.path.display(), size.width, size.height);
            self.writer = Some(open_writer(&self.path, self.fps, size)?);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write(frame)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        if let Some(mut writer) = self.writer {
            writer.release()?;
        }
        Ok(())
    }
}

fn should_quit(q_pressed: bool, input: Option<Input>) -> bool {
    q_pressed || input == Some(Input::Escape)
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let config = Config::load_or_default(DEFAULT_CONFIG_PATH);
    let fps = config.camera.fps as f64;

    fs::create_dir_all(OUTPUT_DIR).with_context(|| format!("Failed to create {}", OUTPUT_DIR))?;
    let mut color_recording = Recording::new(Path::new(OUTPUT_DIR).join(COLOR_FILE), fps);
    let mut depth_recording = Recording::new(Path::new(OUTPUT_DIR).join(DEPTH_FILE), fps);

    let mut source = DepthCameraSource::open(&config.camera)?;
    let mut window = ViewWindow::new("Stream");
    let mut frames = 0u64;

    while let Some((color, depth)) = source.next_frame_set()? {
        if depth.empty() {
            // 深度が届かない間もカラーを出してキー入力を受ける
            window.show_frame(&color)?;
        } else {
            let depth_colormap = colorize_depth(&depth)?;
            color_recording.write(&color)?;
            depth_recording.write(&depth_colormap)?;
            frames += 1;
            window.show_frame(&depth_colormap)?;
        }

        if should_quit(window.key_pressed(Key::Q), window.poll_input()) {
            break;
        }
    }

    color_recording.finish()?;
    depth_recording.finish()?;
    info!("Recorded {} frames", frames);
    Ok(())
}
