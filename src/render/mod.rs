pub mod canvas;
pub mod overlay;
pub mod plot3d;
pub mod skeleton;
pub mod window;

pub use canvas::Canvas;
pub use minifb::Key;
pub use overlay::{draw_poses, FpsMeter};
pub use plot3d::Plotter3d;
pub use window::{ViewWindow, CANVAS_WINDOW_TITLE, FRAME_WINDOW_TITLE};
