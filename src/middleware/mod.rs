pub mod access_gate;
pub mod api_key;
pub mod auth;

pub use access_gate::{access_gate_middleware, evaluate_request};
pub use api_key::{authenticate_api_key, require_permission, AuthenticatedKey};
pub use auth::{bearer_token, require_admin, CurrentAdmin};
