pub mod breakout;
pub mod gap;
pub mod momentum;
pub mod volume_spike;
pub mod vwap;

pub use breakout::BreakoutStrategy;
pub use gap::GapStrategy;
pub use momentum::MomentumStrategy;
pub use volume_spike::VolumeSpikeStrategy;
pub use vwap::VwapStrategy;
