#[cfg(feature = "desktop")]
pub mod detector;
pub mod estimator;
pub mod keypoint;
pub mod model;
#[cfg(feature = "desktop")]
pub mod preprocess;

#[cfg(feature = "desktop")]
pub use detector::OnnxPoseEstimator;
pub use estimator::PoseEstimator;
pub use keypoint::{Keypoint, KeypointIndex, LegKeypoints, Pose, Side};
pub use model::PoseModel;
#[cfg(feature = "desktop")]
pub use preprocess::{preprocess_for_movenet, preprocess_for_spinepose, Letterbox};
