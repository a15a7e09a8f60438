pub mod extract;
pub mod keypoint;
pub mod network;
pub mod parse;
pub mod preprocess;

pub use extract::{extract_poses, RawPose, UPSAMPLE_RATIO};
pub use keypoint::{Joint3d, JointIndex, Keypoint, Pose2d, Pose3d};
pub use network::{Backend, NetworkOutput, PoseNetwork};
pub use parse::{ParsedPoses, PoseParser, AVG_PERSON_HEIGHT};
pub use preprocess::{preprocess_frame, rotate_to_vertical, NetworkInput, DEFAULT_HEIGHT_SIZE, STRIDE};
