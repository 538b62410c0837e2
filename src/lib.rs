//! geochat: location-aware agent chat CLI
//!
//! This library provides:
//! - Location resolution with an ordered chain of IP geolocation strategies
//! - Streaming chat with a hosted conversational agent
//! - Network and geolocation diagnostics
//! - Device record packaging

pub mod chat;
pub mod config;
pub mod diagnostics;
pub mod location;
pub mod record;
pub mod transport;

pub use config::Config;
pub use location::{LocationResolver, LocationResult};
