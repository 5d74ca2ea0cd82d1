//! Per-job event stream
//!
//! Durable, resumable events: the store's append-only log is the source of
//! truth, a broadcast channel gives attached subscribers low latency, and
//! [`follow_events`] stitches the two into a gap-free, duplicate-free
//! sequence for any `last_event_id`.

mod bus;
mod stream;
mod types;

pub use bus::{BusMetrics, JobEventBus};
pub use stream::follow_events;
pub use types::{JobEvent, is_terminal_event_type};
