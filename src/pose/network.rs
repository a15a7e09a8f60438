use anyhow::{bail, Context, Result};
use ndarray::{Array3, Array4, ArrayViewD, Axis, Ix3};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Tensor;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// 3D特徴マップのチャンネル数（19関節 × xyz）
pub const FEATURE_CHANNELS: usize = 57;
/// ヒートマップのチャンネル数（18キーポイント + 背景）
pub const HEATMAP_CHANNELS: usize = 19;
/// PAF のチャンネル数（19リンク × xy）
pub const PAF_CHANNELS: usize = 38;

const FEATURES_OUTPUT: &str = "features";
const HEATMAPS_OUTPUT: &str = "heatmaps";
const PAFS_OUTPUT: &str = "pafs";

/// 推論に使う実行プロバイダ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Cpu,
    Cuda,
    /// OpenVINO のデバイス名 (CPU, GPU, MYRIAD など)
    OpenVino(String),
}

impl Backend {
    /// `--use-openvino` と `--device` から選ぶ
    pub fn select(use_openvino: bool, device: &str) -> Self {
        if use_openvino {
            Self::OpenVino(device.to_uppercase())
        } else {
            device.parse().unwrap_or(Self::Cpu)
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Cuda),
            other => Err(format!("Unknown device: {}", other)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::OpenVino(device) => write!(f, "openvino:{}", device),
        }
    }
}

/// ネットワークの生出力（バッチ次元は除去済み）
#[derive(Debug, Clone)]
pub struct NetworkOutput {
    /// [57, h, w] ルート相対3D座標マップ
    pub features: Array3<f32>,
    /// [19, h, w]
    pub heatmaps: Array3<f32>,
    /// [38, h, w]
    pub pafs: Array3<f32>,
}

impl NetworkOutput {
    /// チャンネル数と空間サイズを検証して構築
    pub fn new(features: Array3<f32>, heatmaps: Array3<f32>, pafs: Array3<f32>) -> Result<Self> {
        let expected = [
            ("features", &features, FEATURE_CHANNELS),
            ("heatmaps", &heatmaps, HEATMAP_CHANNELS),
            ("pafs", &pafs, PAF_CHANNELS),
        ];
        for (name, map, channels) in expected {
            if map.shape()[0] != channels {
                bail!("{} has {} channels, expected {}", name, map.shape()[0], channels);
            }
            if map.shape()[1..] != features.shape()[1..] {
                bail!("{} spatial size {:?} differs from features {:?}", name, &map.shape()[1..], &features.shape()[1..]);
            }
        }
        Ok(Self { features, heatmaps, pafs })
    }

    /// 特徴マップのサイズ (height, width)
    pub fn map_size(&self) -> (usize, usize) {
        (self.features.shape()[1], self.features.shape()[2])
    }
}

/// 3D姿勢推定ネットワーク（ONNX Runtime）
pub struct PoseNetwork {
    session: Session,
    input_name: String,
}

impl PoseNetwork {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P, backend: &Backend) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            bail!("Model file not found: {}", model_path.display());
        }

        let builder = register_backend(Session::builder()?, backend)?;
        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)
            .context("Failed to load ONNX model")?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "data".to_string());
        info!("Model loaded: {} ({})", model_path.display(), backend);

        Ok(Self { session, input_name })
    }

    /// 前処理済みテンソルから特徴マップ・ヒートマップ・PAFを得る
    ///
    /// 入力: [1, 3, H, W] の f32 テンソル
    pub fn infer(&mut self, input: Array4<f32>) -> Result<NetworkOutput> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Inference failed")?;

        let features = extract_map(outputs[FEATURES_OUTPUT].try_extract_array()?, FEATURES_OUTPUT)?;
        let heatmaps = extract_map(outputs[HEATMAPS_OUTPUT].try_extract_array()?, HEATMAPS_OUTPUT)?;
        let pafs = extract_map(outputs[PAFS_OUTPUT].try_extract_array()?, PAFS_OUTPUT)?;

        NetworkOutput::new(features, heatmaps, pafs)
    }
}

/// [1, C, h, w] の出力からバッチ次元を外す
fn extract_map(output: ArrayViewD<f32>, name: &str) -> Result<Array3<f32>> {
    if output.ndim() != 4 || output.shape()[0] != 1 {
        bail!("Unexpected shape for {}: {:?}", name, output.shape());
    }
    let map = output
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix3>()
        .with_context(|| format!("Failed to reshape {}", name))?;
    Ok(map.to_owned())
}

#[allow(unused_mut)]
fn register_backend(mut builder: SessionBuilder, backend: &Backend) -> Result<SessionBuilder> {
    match backend {
        Backend::Cpu => {}
        Backend::Cuda => {
            #[cfg(feature = "cuda")]
            {
                use ort::execution_providers::CUDAExecutionProvider;
                builder = builder
                    .with_execution_providers([CUDAExecutionProvider::default().build()])
                    .context("Failed to register CUDA execution provider")?;
            }
            #[cfg(not(feature = "cuda"))]
            warn!("Built without the `cuda` feature; running on CPU");
        }
        Backend::OpenVino(device) => {
            #[cfg(feature = "openvino")]
            {
                use ort::execution_providers::OpenVINOExecutionProvider;
                builder = builder
                    .with_execution_providers([OpenVINOExecutionProvider::default()
                        .with_device_type(device.as_str())
                        .build()])
                    .context("Failed to register OpenVINO execution provider")?;
            }
            #[cfg(not(feature = "openvino"))]
            warn!("Built without the `openvino` feature; ignoring device {} and running on CPU", device);
        }
    }
    Ok(builder)
}
