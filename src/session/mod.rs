//! Session persistence for the request layer and the engine.
//! One [`SessionHandle`] is built per boot by [`SessionStoreFactory`] and
//! shared by reference; everything else here hangs off that handle.

mod cookie;
mod factory;
mod middleware;
mod store;

pub use cookie::{cookie_parser, sign_session_id, unsign_session_id, CookieJar};
pub use factory::{SessionHandle, SessionOptions, SessionStoreFactory, StoreBackend, DEFAULT_SESSION_TTL, SESSION_COOKIE};
pub use middleware::{session_middleware, Session};
pub use store::{
    DataStoreSessionStore, MemoryStore, PassportState, SessionData, SessionStore, StoreFuture, StoreHealth,
    BACKEND_CONNECT_TIMEOUT, PRUNE_EVERY,
};
