pub mod bucket;
pub mod minute_bars;
pub mod tick;

pub use bucket::{bucket, MinuteKey};
pub use minute_bars::{MinuteBar, MinuteBarBuffer};
pub use tick::{RawTick, TickRecord};
