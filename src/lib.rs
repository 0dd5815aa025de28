// Satchel - request-scoped sessions for Rust HTTP services
//
// Re-exports the request plumbing from satchel-core and the session
// middleware from satchel-session under one crate.

// Re-export core functionality
pub use satchel_core::*;

pub use satchel_session;
pub use satchel_session::{
    Finalize, MemorySessionStore, Origin, RequestSessionExt, Session, SessionConfig,
    SessionContext, SessionError, SessionMiddleware, SessionResult, SessionStore, StoreConfig,
    StoreOptions,
};

#[cfg(feature = "redis")]
pub use satchel_session::RedisSessionStore;

// Re-export helpers handlers commonly need
pub use async_trait::async_trait;
pub use serde_json;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        CookieJar,
        CookieOptions,
        Cookies,
        Error,
        HttpRequest,
        HttpResponse,
        MemorySessionStore,
        Middleware,
        MiddlewareChain,
        Next,
        RequestSessionExt,
        SameSite,
        Session,
        SessionConfig,
        SessionContext,
        SessionMiddleware,
        SessionStore,
        StoreConfig,
        async_trait,
        handler,
    };

    #[cfg(feature = "redis")]
    pub use crate::RedisSessionStore;
}
