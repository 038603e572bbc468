// The binary in main.rs is a thin front end; integration tests and criterion
// benchmarks drive the same module tree through this library target.

pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod event;
pub mod generator;
pub mod remote;
pub mod session;
pub mod store;
pub mod ui;
