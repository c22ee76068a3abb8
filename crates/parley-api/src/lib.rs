pub mod auth;
pub mod conversations;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod middleware;
pub mod oauth;
pub mod routes;
pub mod session;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
