//! Testing utilities and mock implementations
//!
//! Mock broker client, hand-driven clock and scripted link probe for
//! exercising the publisher without a network or an MQTT broker.

pub mod mocks;

pub use mocks::*;
