use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::error;

use parley_db::Database;
use parley_gateway::Dispatcher;

use crate::error::ApiError;
use crate::oauth::OAuthClient;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub oauth: OAuthClient,
    /// CSRF states issued by /auth/login, with issue time
    pub pending_states: Mutex<HashMap<String, Instant>>,
    /// Serializes find-or-create so one external id maps to one user
    pub login_guard: Mutex<()>,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String, dispatcher: Dispatcher, oauth: OAuthClient) -> Self {
        Self {
            db,
            jwt_secret,
            dispatcher,
            oauth,
            pending_states: Mutex::new(HashMap::new()),
            login_guard: Mutex::new(()),
        }
    }
}

/// Run blocking store work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> parley_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
