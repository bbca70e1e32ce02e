#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod app;
pub mod config;
pub mod controller;
pub mod patterns;
pub mod rollout;
pub mod service;
pub mod shutdown;
pub mod watch;
pub mod worker;
