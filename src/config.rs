use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

/// デフォルトの設定ファイルパス
pub const DEFAULT_CONFIG_PATH: &str = "setting.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// 深度カメラのストリーム設定
#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_fps() -> u32 { 30 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

/// ボーン座標の送信先
#[derive(Debug, Deserialize, Clone)]
pub struct SocketConfig {
    #[serde(default = "default_tcp_ip")]
    pub tcp_ip: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 接続タイムアウト（ミリ秒）
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_tcp_ip() -> String { "127.0.0.1".to_string() }
fn default_tcp_port() -> u16 { 5005 }
fn default_enabled() -> bool { true }
fn default_connect_timeout_ms() -> u64 { 100 }

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_ip: default_tcp_ip(),
            tcp_port: default_tcp_port(),
            enabled: default_enabled(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl SocketConfig {
    /// "ip:port" 形式のアドレス
    pub fn addr(&self) -> String {
        format!("{}:{}", self.tcp_ip, self.tcp_port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_canvas_width")]
    pub canvas_width: usize,
    #[serde(default = "default_canvas_height")]
    pub canvas_height: usize,
}

fn default_canvas_width() -> usize { 1280 }
fn default_canvas_height() -> usize { 720 }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    /// 読み込みに失敗した場合はデフォルト値を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}; using default settings", e);
                Self::default()
            }
        }
    }
}
