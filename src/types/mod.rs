//! Integration with external types.
//!
//! Conversions between the wire-level temporal values and [`time`]'s
//! types (feature `time`), and a serde wrapper over the json codecs
//! (feature `json`).
#[cfg(feature = "json")]
mod json;
#[cfg(feature = "json")]
pub use json::Json;

#[cfg(feature = "time")]
mod time;
#[cfg(feature = "time")]
pub use time::InfiniteValue;
