pub mod appresult;
pub mod chat;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod hub;
pub mod profile;
pub mod protocol;
pub mod validate;

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use axum::extract::FromRef;

pub use appresult::{AppError, AppResult};
pub use config::Config;
pub use coordinator::Coordinator;
pub use engine::Engine;
pub use error::EngineError;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub config: Arc<Config>,
}

/// Milliseconds since the UNIX epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Locks `mutex`, carrying on with the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
