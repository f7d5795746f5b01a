//! Low-level building blocks shared by every other module
//!
//! [`math`] holds the nalgebra aliases and transform helpers, [`memory`] the
//! frame-scoped scratch heap, [`collections`] the bit array used for culling
//! results and [`logging`] the `env_logger` setup.

pub mod collections;
pub mod logging;
pub mod math;
pub mod memory;
