//! # Architecture Abstraction Layer
//!
//! Hardware cycle clocks. Each port implements [`crate::clock::CycleClock`];
//! hosted builds use [`crate::clock::SimClock`] or
//! [`crate::clock::MonotonicClock`] instead.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;
