use anyhow::{Context, Result};
use clap::Parser;
use opencv::prelude::*;
use std::time::Instant;
use tracing::info;

use pose3d_stream::camera::open_source;
use pose3d_stream::cli::{resolve_fx, Cli};
use pose3d_stream::config::Config;
use pose3d_stream::geometry::{self, Extrinsics};
use pose3d_stream::playback::{Input, LoopAction, Playback, HOLD_REFRESH_INTERVAL};
use pose3d_stream::pose::{preprocess_frame, rotate_to_vertical, Backend, Pose3d, PoseNetwork, PoseParser};
use pose3d_stream::render::{
    draw_poses, Canvas, FpsMeter, Plotter3d, ViewWindow, CANVAS_WINDOW_TITLE, FRAME_WINDOW_TITLE,
};
use pose3d_stream::sender::TcpSender;

/// フレーム表示と 3D キャンバス
struct Views {
    frame_window: ViewWindow,
    canvas_window: ViewWindow,
    canvas: Canvas,
    plotter: Plotter3d,
}

impl Views {
    fn new(canvas_width: usize, canvas_height: usize) -> Self {
        Self {
            frame_window: ViewWindow::new(FRAME_WINDOW_TITLE),
            canvas_window: ViewWindow::new(CANVAS_WINDOW_TITLE),
            canvas: Canvas::new(canvas_width, canvas_height),
            plotter: Plotter3d::new(canvas_width, canvas_height),
        }
    }

    fn refresh_canvas(&mut self, poses: &[Pose3d]) -> Result<()> {
        let (position, left_down) = self.canvas_window.mouse();
        self.plotter.handle_mouse(position, left_down);
        self.plotter.plot(&mut self.canvas, poses);
        self.canvas_window.show_canvas(&self.canvas)
    }

    fn poll_input(&self) -> Option<Input> {
        self.frame_window
            .poll_input()
            .or_else(|| self.canvas_window.poll_input())
    }

    /// 再開か終了が押されるまでキャンバスを回せる状態で待つ
    fn hold(&mut self, playback: &mut Playback, poses: &[Pose3d]) -> Result<LoopAction> {
        loop {
            self.refresh_canvas(poses)?;
            self.frame_window.pump();
            match playback.while_held(self.poll_input()) {
                LoopAction::Hold => std::thread::sleep(HOLD_REFRESH_INTERVAL),
                action => return Ok(action),
            }
        }
    }
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let cli = Cli::parse();

    let source_kind = cli.source_kind()?;
    let config = Config::load_or_default(&cli.config);
    let extrinsics = Extrinsics::load(&cli.extrinsics_path)
        .with_context(|| format!("Failed to load extrinsics from {}", cli.extrinsics_path.display()))?;

    let backend = Backend::select(cli.use_openvino, &cli.device);
    let mut network = PoseNetwork::new(&cli.model, &backend)?;

    let mut source = open_source(&source_kind, &config.camera)?;
    let live = source.is_live();
    let mut parser = PoseParser::new(live);

    let mut sender = (config.socket.enabled && !cli.no_send).then(|| TcpSender::new(&config.socket));
    match &sender {
        Some(s) => info!("Sending bones to {}", s.addr()),
        None => info!("Bone sending disabled"),
    }

    let mut views = Views::new(config.display.canvas_width, config.display.canvas_height);
    let mut fps = FpsMeter::new();
    let mut playback = Playback::default();
    let mut fx: Option<f32> = None;
    let mut frames = 0u64;
    // 送信中の人物ID（追跡時のみ）
    let mut sent_person: Option<u32> = None;

    info!("Esc: exit, P: pause / next image, Space: resume");

    while let Some(frame) = source.next_frame()? {
        let started = Instant::now();
        let mut frame = if cli.rotation_to_vertical {
            rotate_to_vertical(&frame)?
        } else {
            frame
        };

        let input = preprocess_frame(&frame, cli.height_size)?;
        let focal = *fx.get_or_insert_with(|| resolve_fx(cli.fx, frame.cols()));
        let output = network.infer(input.tensor)?;
        let parsed = parser.parse(&output, input.input_scale, focal)?;
        if let Some(&id) = parsed.track_ids.first() {
            if sent_person.replace(id) != Some(id) {
                info!("Sending bones of person {}", id);
            }
        }

        let mut poses_3d = parsed.poses_3d;
        if !poses_3d.is_empty() {
            geometry::rotate_poses(&mut poses_3d, &extrinsics);
            geometry::to_display_axes(&mut poses_3d);
            if let (Some(sender), Some(bones)) = (sender.as_mut(), geometry::export_bones(&poses_3d)) {
                sender.send(&bones);
            }
        }

        draw_poses(&mut frame, &parsed.poses_2d)?;
        fps.update(started.elapsed());
        fps.draw(&mut frame)?;
        views.frame_window.show_frame(&frame)?;
        views.refresh_canvas(&poses_3d)?;
        frames += 1;

        let action = match playback.after_frame(views.poll_input(), live) {
            LoopAction::Hold => views.hold(&mut playback, &poses_3d)?,
            action => action,
        };
        if action == LoopAction::Exit {
            break;
        }
    }

    info!(
        "Processed {} frames ({})",
        frames,
        sender.map_or("not sent".to_string(), |s| format!("{} send failures", s.failures()))
    );
    Ok(())
}
