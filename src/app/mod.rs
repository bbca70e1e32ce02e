// Async application shell around the synchronous controller core.

mod app;

pub use app::{App, ControllerHandle};
