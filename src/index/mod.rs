//! Index structures built on top of the buffer pool.

mod linear_probe;

pub use linear_probe::{HashFn, LinearProbeHashTable};
