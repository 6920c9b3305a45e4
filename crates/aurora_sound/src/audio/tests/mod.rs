//! Sound manager scenarios against the simulated device

mod concurrency;
mod support;
