use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::camera::SourceKind;
use crate::config::DEFAULT_CONFIG_PATH;
use crate::geometry::DEFAULT_EXTRINSICS_PATH;
use crate::pose::DEFAULT_HEIGHT_SIZE;

/// 焦点距離が未指定のときのフレーム幅に対する係数
const DEFAULT_FX_RATIO: f32 = 0.8;

/// Lightweight 3D human pose estimation demo.
/// Press Esc to exit, "p" to (un)pause video or process next image.
#[derive(Parser, Debug)]
#[command(author, version = env!("POSE3D_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Path to the ONNX model
    #[arg(short, long)]
    pub model: PathBuf,

    /// Path to video file or camera id
    #[arg(long)]
    pub video: Option<String>,

    /// Path to input image(s)
    #[arg(long, num_args = 1..)]
    pub images: Vec<PathBuf>,

    /// Read frames from an Intel depth camera
    #[arg(long, alias = "use-intelrealsensecamera", default_value_t = false)]
    pub use_realsense: bool,

    /// Device to infer on: CPU, GPU (CUDA) or an OpenVINO device name
    #[arg(short, long, default_value = "GPU")]
    pub device: String,

    /// Run inference through the OpenVINO execution provider
    #[arg(long, default_value_t = false)]
    pub use_openvino: bool,

    /// Rotate frames 90 degrees clockwise before inference
    #[arg(long, default_value_t = false)]
    pub rotation_to_vertical: bool,

    /// Network input layer height
    #[arg(long, default_value_t = DEFAULT_HEIGHT_SIZE)]
    pub height_size: i32,

    /// Path to the camera extrinsics JSON
    #[arg(long, default_value = DEFAULT_EXTRINSICS_PATH)]
    pub extrinsics_path: PathBuf,

    /// Camera focal length in pixels (negative: 0.8 * frame width)
    #[arg(long, default_value_t = -1.0, allow_hyphen_values = true)]
    pub fx: f32,

    /// Path to the settings file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Do not send bone positions over TCP
    #[arg(long, default_value_t = false)]
    pub no_send: bool,
}

impl Cli {
    /// 入力は1種類だけ指定できる
    pub fn source_kind(&self) -> Result<SourceKind> {
        let mut kinds = Vec::new();
        if let Some(video) = &self.video {
            kinds.push(SourceKind::Video(video.clone()));
        }
        if !self.images.is_empty() {
            kinds.push(SourceKind::Images(self.images.clone()));
        }
        if self.use_realsense {
            kinds.push(SourceKind::DepthCamera);
        }
        match kinds.len() {
            0 => bail!("Please, provide input data: --video, --images or --use-realsense"),
            1 => Ok(kinds.remove(0)),
            _ => bail!("Only one of --video, --images and --use-realsense can be given"),
        }
    }
}

/// `fx` が負ならフレーム幅から決める
pub fn resolve_fx(fx: f32, frame_width: i32) -> f32 {
    if fx < 0.0 {
        DEFAULT_FX_RATIO * frame_width as f32
    } else {
        fx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pose3d-stream").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["-m", "model.onnx", "--video", "0"]);
        assert_eq!(cli.device, "GPU");
        assert_eq!(cli.height_size, 256);
        assert_eq!(cli.fx, -1.0);
        assert_eq!(cli.extrinsics_path, PathBuf::from("data/extrinsics.json"));
        assert_eq!(cli.config, PathBuf::from("setting.toml"));
        assert!(!cli.no_send);
        assert_eq!(cli.source_kind().unwrap(), SourceKind::Video("0".to_string()));
    }

    #[test]
    fn test_model_is_required() {
        assert!(Cli::try_parse_from(["pose3d-stream", "--video", "0"]).is_err());
    }

    #[test]
    fn test_images_source() {
        let cli = parse(&["-m", "m.onnx", "--images", "a.jpg", "b.jpg"]);
        assert_eq!(
            cli.source_kind().unwrap(),
            SourceKind::Images(vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")])
        );
    }

    #[test]
    fn test_realsense_alone_is_a_source() {
        let cli = parse(&["-m", "m.onnx", "--use-realsense"]);
        assert_eq!(cli.source_kind().unwrap(), SourceKind::DepthCamera);
    }

    #[test]
    fn test_realsense_long_flag_alias() {
        let cli = parse(&["-m", "m.onnx", "--use-intelrealsensecamera"]);
        assert!(cli.use_realsense);
        assert_eq!(cli.source_kind().unwrap(), SourceKind::DepthCamera);
    }

    #[test]
    fn test_source_must_be_unique_and_present() {
        assert!(parse(&["-m", "m.onnx"]).source_kind().is_err());
        assert!(parse(&["-m", "m.onnx", "--video", "a.mp4", "--use-realsense"])
            .source_kind()
            .is_err());
    }

    #[test]
    fn test_explicit_fx() {
        let cli = parse(&["-m", "m.onnx", "--video", "0", "--fx", "500"]);
        assert_eq!(resolve_fx(cli.fx, 1920), 500.0);
        assert_eq!(resolve_fx(-1.0, 1920), 1536.0);
    }
}
