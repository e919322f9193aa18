pub mod lifecycle;

pub use lifecycle::{LifecycleState, Server, ServerError, shutdown_signal};
