//! Login gate for the administrative surface: the `login` and `callback`
//! routes, and the per-request administrator check the engine consults.

mod authorizer;
mod gate;

pub use authorizer::{guard_request, AdminAuthorizer, AdminDirectory, AdminRecord, AuthDecision};
pub use gate::{AuthGate, CallbackParams, PostLoginTarget};

pub const LOGIN_PATH: &str = "/keystone";
pub const CALLBACK_PATH: &str = "/callback";
pub const PUBLIC_ROOT: &str = "/";
