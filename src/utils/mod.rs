//! Utility Module
//!
//! - [`time`]: the host frame clock feeding the signal hub
//!
//! ```rust,ignore
//! use halo::utils::time::Timer;
//!
//! let mut timer = Timer::new();
//! let snapshot = hub.tick_timer(&mut timer);
//! ```

pub mod time;

pub use time::Timer;
