//! Core library of the emergency assistance app.
//!
//! This crate provides the device location layer: caching, fallbacks,
//! reverse geocoding and throttled auto-updates.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

mod api;
pub mod location;

pub use api::HelpmeCore;
