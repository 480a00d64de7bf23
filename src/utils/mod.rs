//! # Utility Modules
//!
//! Supporting utilities for cryptography, logging, timing and metrics.
//!
//! ## Components
//! - **Crypto**: RSA key pairs, SHA-1 with RSA signing and verification
//! - **Logging**: Structured logging configuration
//! - **Time**: Nanoseconds-of-day clock sources
//! - **Metrics**: Thread-safe observability counters
//!
//! ## Security
//! - Key generation draws from the OS RNG
//! - Private key material is never logged

pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod time;

pub use crypto::{generate_key_pair, sign, verify, KeyPair};
pub use time::{Clock, LocalClock};
