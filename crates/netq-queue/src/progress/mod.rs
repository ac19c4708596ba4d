//! Progress aggregation and redraw throttling.

mod aggregator;
mod throttle;

pub use aggregator::{ProgressAggregator, ProgressTotals};
pub use throttle::ProgressThrottle;
