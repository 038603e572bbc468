//! Line-oriented terminal front end: answer parsing and plain-text rendering.

pub mod input;
pub mod render;
