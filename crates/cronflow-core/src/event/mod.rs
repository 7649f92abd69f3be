//! Run event distribution.
//!
//! `EventBus` broadcasts `CronEvent`s to any number of subscribers and plugs
//! into the executor as a `RunObserver`.

pub mod bus;

pub use bus::EventBus;
