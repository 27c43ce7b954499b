pub mod sink;

pub use sink::{ObsCounters, ObsEvent, ObsSink, record, with_sink};
