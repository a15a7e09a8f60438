//! 送信先の代わりに待ち受けて、届いたボーン座標を表示する。

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::net::TcpListener;
use std::path::PathBuf;
use tracing::{info, warn};

use pose3d_stream::config::{Config, DEFAULT_CONFIG_PATH};
use pose3d_stream::sender::parse_payload;

#[derive(Parser, Debug)]
#[command(about = "Print bone positions received from pose3d-stream")]
struct Args {
    /// Path to the settings file ([socket] section is used)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Exit after this many payloads
    #[arg(long)]
    count: Option<usize>,
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let args = Args::parse();
    let config = Config::load_or_default(&args.config);

    let addr = config.socket.addr();
    let listener = TcpListener::bind(&addr).with_context(|| format!("Failed to listen on {}", addr))?;
    info!("Listening on {}", addr);

    let mut received = 0usize;
    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        let mut payload = String::new();
        if let Err(e) = stream.read_to_string(&mut payload) {
            warn!("Read failed: {}", e);
            continue;
        }

        match parse_payload(&payload) {
            Ok(bones) => {
                received += 1;
                println!("#{}", received);
                for (i, b) in bones.iter().enumerate() {
                    println!("  bone {:2}: {:9.2} {:9.2} {:9.2}", i, b.x, b.y, b.z);
                }
            }
            Err(e) => warn!("{:#}", e),
        }

        if args.count.is_some_and(|n| received >= n) {
            break;
        }
    }
    Ok(())
}
