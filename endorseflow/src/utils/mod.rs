//! Utility functions for timestamps, clocks and input validation.

mod clock;
pub mod timestamps;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use timestamps::{format_timestamp, now_utc, Timestamp};
