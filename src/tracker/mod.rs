pub mod identity;
pub mod one_euro;

pub use identity::{PoseTracker, TrackedPose};
pub use one_euro::{OneEuroFilter, TranslationFilter};
