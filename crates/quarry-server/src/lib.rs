//! Process plumbing for the `quarry` binary: configuration, component
//! wiring, the HTTP surface and the serve loop.

pub mod components;
pub mod config;
pub mod http;
pub mod render;
pub mod serve;
