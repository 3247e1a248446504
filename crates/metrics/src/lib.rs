//! Bounded time-series model driving the dashboard visualizations.
//!
//! Pure data structures, no I/O: rolling per-channel sample windows, the
//! immutable snapshots both transports normalize into, and the aggregator
//! that fans ingested snapshots out to presentation collaborators.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod aggregator;
mod buffer;
mod snapshot;

pub use aggregator::{MetricsAggregator, Subscriber, SubscriptionId};
pub use buffer::{DEFAULT_CAPACITY, Sample, TimeSeriesBuffer};
pub use snapshot::{MetricSnapshot, channels};
