pub mod capture;

pub use capture::{open_source, DepthCameraSource, FrameSource, ImageSource, SourceKind, VideoSource};
