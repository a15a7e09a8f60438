use anyhow::{bail, Context, Result};
use nalgebra::Vector3;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SocketConfig;
use crate::geometry::BONE_COUNT;

/// 1メッセージあたりの数値の数（ボーン × xyz）
pub const PAYLOAD_VALUES: usize = BONE_COUNT * 3;

/// ボーン中点を空白区切りの数値列にする（x0 y0 z0 x1 ...）
pub fn format_payload(bones: &[Vector3<f32>; BONE_COUNT]) -> String {
    bones
        .iter()
        .flat_map(|b| [b.x, b.y, b.z])
        .map(|v| format!("{:?}", v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `format_payload` の逆変換
pub fn parse_payload(payload: &str) -> Result<[Vector3<f32>; BONE_COUNT]> {
    let values = payload
        .split_whitespace()
        .map(|v| v.parse::<f32>().with_context(|| format!("Invalid number in payload: {}", v)))
        .collect::<Result<Vec<_>>>()?;
    if values.len() != PAYLOAD_VALUES {
        bail!("Payload has {} values, expected {}", values.len(), PAYLOAD_VALUES);
    }
    Ok(std::array::from_fn(|i| {
        Vector3::new(values[i * 3], values[i * 3 + 1], values[i * 3 + 2])
    }))
}

/// ボーン位置の送信クライアント
///
/// 毎フレーム新しい TCP 接続を張り、全データを書いて閉じる。
/// 失敗は記録して捨てる（呼び出し側へは返さない）。
pub struct TcpSender {
    addr: String,
    timeout: Duration,
    failures: u64,
}

impl TcpSender {
    pub fn new(config: &SocketConfig) -> Self {
        Self {
            addr: config.addr(),
            timeout: Duration::from_millis(config.connect_timeout_ms),
            failures: 0,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// これまでの送信失敗回数
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// 送信する。成功したかどうかだけを返す。
    pub fn send(&mut self, bones: &[Vector3<f32>; BONE_COUNT]) -> bool {
        let payload = format_payload(bones);
        match self.try_send(payload.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                if self.failures == 0 {
                    warn!("Failed to send bones to {}: {:#}", self.addr, e);
                } else {
                    debug!("Failed to send bones to {}: {:#}", self.addr, e);
                }
                self.failures += 1;
                false
            }
        }
    }

    fn try_send(&self, data: &[u8]) -> Result<()> {
        let addr = self.resolve()?;
        let mut stream = TcpStream::connect_timeout(&addr, self.timeout)
            .with_context(|| format!("Failed to connect to {}", addr))?;
        stream.write_all(data).context("Failed to write payload")?;
        Ok(())
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.addr
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}", self.addr))?
            .next()
            .with_context(|| format!("No address for {}", self.addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn bones() -> [Vector3<f32>; BONE_COUNT] {
        std::array::from_fn(|i| Vector3::new(i as f32, -(i as f32) * 0.5, 100.25))
    }

    fn socket_config(port: u16) -> SocketConfig {
        SocketConfig {
            tcp_ip: "127.0.0.1".to_string(),
            tcp_port: port,
            enabled: true,
            connect_timeout_ms: 100,
        }
    }

    #[test]
    fn test_format_payload() {
        let payload = format_payload(&bones());
        let values: Vec<&str> = payload.split(' ').collect();
        assert_eq!(values.len(), PAYLOAD_VALUES);
        assert_eq!(&values[..6], &["0.0", "-0.0", "100.25", "1.0", "-0.5", "100.25"]);
    }

    #[test]
    fn test_parse_payload_inverts_format() {
        let parsed = parse_payload(&format_payload(&bones())).unwrap();
        assert_eq!(parsed, bones());
    }

    #[test]
    fn test_parse_payload_rejects_bad_input() {
        assert!(parse_payload("1 2 3").is_err());
        let mut payload = format_payload(&bones());
        payload.push_str(" x");
        assert!(parse_payload(&payload).is_err());
    }

    #[test]
    fn test_send_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let receiver = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = String::new();
            stream.read_to_string(&mut received).unwrap();
            received
        });

        let mut sender = TcpSender::new(&socket_config(port));
        assert!(sender.send(&bones()));
        let received = receiver.join().unwrap();
        assert_eq!(received, format_payload(&bones()));
        assert_eq!(sender.failures(), 0);
    }

    #[test]
    fn test_send_failure_is_swallowed() {
        // 空いているポートを確保してから閉じる
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut sender = TcpSender::new(&socket_config(port));
        assert!(!sender.send(&bones()));
        assert!(!sender.send(&bones()));
        assert_eq!(sender.failures(), 2);
    }

    #[test]
    fn test_unresolvable_address_is_swallowed() {
        let mut config = socket_config(5005);
        config.tcp_ip = "not a host".to_string();
        let mut sender = TcpSender::new(&config);
        assert!(!sender.send(&bones()));
        assert_eq!(sender.failures(), 1);
    }
}
