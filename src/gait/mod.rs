pub mod angle;
pub mod cycle;
pub mod phase;
pub mod pipeline;
pub mod sample;
pub mod smooth;
pub mod summary;

pub use angle::{angle_deg, angle_deg_2d};
pub use cycle::{frame_times, CycleDetector, CycleRange, Extremum};
pub use phase::{
    segment_cycle, GaitCycle, PercentPartitioner, Phase, PhasePartitioner, PhaseSegment, PhaseTable,
};
pub use pipeline::{GaitAnalyzer, GaitReport};
pub use sample::{FrameSample, Joint};
pub use smooth::smooth;
pub use summary::{median, summarize_cycle, summarize_segment, PhaseStat};
