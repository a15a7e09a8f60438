//! Playing / Paused loop control.
//!
//! After every frame the main loop asks [`Playback::after_frame`] what to do.
//! `Hold` means: stay on the current frame and keep re-plotting the 3D canvas,
//! feeding keys to [`Playback::while_held`] until it returns something else.

use std::time::Duration;

/// 一時停止中に 3D キャンバスを描き直す間隔
pub const HOLD_REFRESH_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Playback {
    #[default]
    Playing,
    Paused,
}

/// ループ制御に関係するキー入力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Escape,
    Pause,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// 次のフレームへ
    Continue,
    /// 現フレームに留まる
    Hold,
    Exit,
}

impl Playback {
    /// フレーム表示後の遷移。静止画入力では常に現フレームに留まる。
    pub fn after_frame(&mut self, input: Option<Input>, live: bool) -> LoopAction {
        match input {
            Some(Input::Escape) => return LoopAction::Exit,
            Some(Input::Pause) => self.toggle(),
            _ => {}
        }
        if *self == Playback::Paused || !live {
            LoopAction::Hold
        } else {
            LoopAction::Continue
        }
    }

    /// 留まっている間の遷移。P か Space で再生に戻る。
    pub fn while_held(&mut self, input: Option<Input>) -> LoopAction {
        match input {
            Some(Input::Escape) => LoopAction::Exit,
            Some(Input::Pause) | Some(Input::Space) => {
                *self = Playback::Playing;
                LoopAction::Continue
            }
            None => LoopAction::Hold,
        }
    }

    fn toggle(&mut self) {
        *self = match self {
            Playback::Playing => Playback::Paused,
            Playback::Paused => Playback::Playing,
        };
    }
}
