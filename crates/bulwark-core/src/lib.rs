//! Bulwark Core - primitives shared by every Bulwark crate.
//!
//! Bulwark is the persistence and admission-control substrate that edge
//! services run on. This crate holds the few pieces that every layer
//! depends on:
//!
//! - [`Clock`]: an injectable time source, so token buckets, TTLs and quota
//!   days can be driven deterministically in tests.
//! - UTC day helpers ([`utc_day`], [`next_utc_midnight`]) used by the quota
//!   tracker's day rollover.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod clock;
pub mod time;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use time::{next_utc_midnight, utc_day};
