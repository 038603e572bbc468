pub mod demo;
pub mod questions;

pub use demo::DemoBackend;
pub use questions::{PreparedQuestion, instantiate, prepare, sample_bindings};
