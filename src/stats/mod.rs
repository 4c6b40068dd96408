//! C1 (ring buffer) and C2 (statistical kernel).

pub mod kernel;
pub mod ring_buffer;

pub use kernel::{Statistics, StatisticalKernel, TrendDirection, TrendResult, VolatilityResult, ZScoreResult};
pub use ring_buffer::RingBuffer;
