use anyhow::{Context, Result};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
};

use super::canvas::Canvas;
use crate::playback::Input;

pub const FRAME_WINDOW_TITLE: &str = "ICV 3D Human Pose Estimation";
pub const CANVAS_WINDOW_TITLE: &str = "Canvas 3D";

/// minifb ウィンドウ
///
/// 最初に表示した画像の大きさで開き、以降は同じ大きさに合わせて表示する。
pub struct ViewWindow {
    title: String,
    window: Option<Window>,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl ViewWindow {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            window: None,
            buffer: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    fn ensure_window(&mut self, width: usize, height: usize) -> Result<&mut Window> {
        if self.window.is_none() {
            let window = Window::new(
                &self.title,
                width,
                height,
                WindowOptions {
                    resize: false,
                    ..WindowOptions::default()
                },
            )
            .with_context(|| format!("Failed to open window {}", self.title))?;
            self.width = width;
            self.height = height;
            self.buffer = vec![0u32; width * height];
            self.window = Some(window);
        }
        self.window.as_mut().context("Window is not open")
    }

    /// BGR Mat を表示
    pub fn show_frame(&mut self, frame: &Mat) -> Result<()> {
        self.ensure_window(frame.cols() as usize, frame.rows() as usize)?;

        let mut resized = Mat::default();
        let frame = if frame.cols() as usize != self.width || frame.rows() as usize != self.height {
            imgproc::resize(
                frame,
                &mut resized,
                Size::new(self.width as i32, self.height as i32),
                0.0,
                0.0,
                imgproc::INTER_LINEAR,
            )?;
            &resized
        } else {
            frame
        };
        bgr_to_buffer(frame, &mut self.buffer)?;
        self.present()
    }

    /// 3D キャンバスを表示
    pub fn show_canvas(&mut self, canvas: &Canvas) -> Result<()> {
        let window = self.ensure_window(canvas.width(), canvas.height())?;
        window.update_with_buffer(canvas.buffer(), canvas.width(), canvas.height())?;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if let Some(window) = self.window.as_mut() {
            window.update_with_buffer(&self.buffer, self.width, self.height)?;
        }
        Ok(())
    }

    /// 描画せずにイベントだけ処理
    pub fn pump(&mut self) {
        if let Some(window) = self.window.as_mut() {
            window.update();
        }
    }

    /// 前回の更新以降に押されたループ制御キー
    pub fn poll_input(&self) -> Option<Input> {
        let window = self.window.as_ref()?;
        if !window.is_open() || window.is_key_pressed(Key::Escape, KeyRepeat::No) {
            Some(Input::Escape)
        } else if window.is_key_pressed(Key::P, KeyRepeat::No) {
            Some(Input::Pause)
        } else if window.is_key_pressed(Key::Space, KeyRepeat::No) {
            Some(Input::Space)
        } else {
            None
        }
    }

    /// キー (minifb の Key) が押されたか
    pub fn key_pressed(&self, key: Key) -> bool {
        self.window
            .as_ref()
            .is_some_and(|w| w.is_key_pressed(key, KeyRepeat::No))
    }

    /// カーソル位置と左ボタンの状態
    pub fn mouse(&self) -> (Option<(f32, f32)>, bool) {
        match self.window.as_ref() {
            Some(w) => (w.get_mouse_pos(MouseMode::Discard), w.get_mouse_down(MouseButton::Left)),
            None => (None, false),
        }
    }
}

/// 8bit BGR を 0RGB の u32 へ
pub fn bgr_to_buffer(frame: &Mat, buffer: &mut [u32]) -> Result<()> {
    let continuous;
    let frame = if frame.is_continuous() {
        frame
    } else {
        continuous = frame.try_clone()?;
        &continuous
    };
    let bytes = frame.data_bytes()?;
    for (dst, px) in buffer.iter_mut().zip(bytes.chunks_exact(3)) {
        let (b, g, r) = (px[0] as u32, px[1] as u32, px[2] as u32);
        *dst = (r << 16) | (g << 8) | b;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_bgr_to_buffer() {
        let frame = Mat::new_rows_cols_with_default(2, 3, CV_8UC3, Scalar::new(1.0, 2.0, 3.0, 0.0)).unwrap();
        let mut buffer = vec![0u32; 6];
        bgr_to_buffer(&frame, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&p| p == 0x030201));
    }

    #[test]
    fn test_unopened_window_has_no_input() {
        let window = ViewWindow::new("test");
        assert!(!window.key_pressed(Key::Q));
        assert_eq!(window.poll_input(), None);
        assert_eq!(window.mouse(), (None, false));
    }
}
