//! Utilities for testing code built on dspar. They are used for testing the framework itself,
//!  but they are also exported for application testing, which is why they are part of the
//!  crate's regular (non-#[cfg(test)]) code.

pub mod fake_peer;
pub mod loopback;
pub mod stages;
