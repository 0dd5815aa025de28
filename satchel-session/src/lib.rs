//! Cookie-keyed, store-backed sessions for satchel.
//!
//! For each request [`SessionMiddleware`] reads the identifier cookie, loads
//! the matching record from a [`SessionStore`], and hands handlers a mutable
//! [`Session`] through [`SessionContext`]. After the handler returns, and
//! even if it failed, the session is finalized exactly once:
//!
//! - never touched: nothing happens;
//! - set to `null`: the cookie is cleared and the record deleted;
//! - new and still empty: nothing happens;
//! - changed: the record is saved and the cookie refreshed;
//! - otherwise: nothing happens.
//!
//! Records are base64-wrapped JSON. A record that fails to decode is
//! treated as missing, and so is a store that fails to answer a read.
//!
//! # Features
//!
//! - `redis` - Redis session storage (enabled by default)
//! - `redis-tls` - `rediss://` connections
//!
//! # Examples
//!
//! ```no_run
//! use satchel_core::{HttpRequest, HttpResponse, MiddlewareChain, handler};
//! use satchel_session::*;
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RedisSessionStore::new(StoreConfig::new().with_db(1)).await?;
//!     let config = SessionConfig::new()
//!         .with_key("app:sess")
//!         .with_signing_key(std::env::var("SESSION_SECRET")?);
//!
//!     let chain = MiddlewareChain::new().with(SessionMiddleware::new(config, store)?);
//!
//!     let logout = handler(|req: HttpRequest| async move {
//!         req.set_session(Value::Null)?;
//!         Ok::<_, satchel_core::Error>(HttpResponse::no_content())
//!     });
//!
//!     chain.apply(HttpRequest::new("POST", "/logout"), logout).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod identifier;
pub mod middleware;
pub mod session;
pub mod store;

#[cfg(feature = "redis")]
pub mod redis_session;

pub use codec::{Fields, decode, encode};
pub use config::{DEFAULT_KEY, SessionConfig, StoreConfig, StoreOptions};
pub use context::{Finalize, Origin, RequestSessionExt, SessionContext};
pub use error::{SessionError, SessionResult};
pub use identifier::IdentifierResolver;
pub use middleware::SessionMiddleware;
pub use session::Session;
pub use store::{MemorySessionStore, SessionStore};

#[cfg(feature = "redis")]
pub use redis_session::RedisSessionStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{SessionConfig, StoreConfig};
    pub use crate::context::{RequestSessionExt, SessionContext};
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::middleware::SessionMiddleware;
    pub use crate::session::Session;
    pub use crate::store::{MemorySessionStore, SessionStore};

    #[cfg(feature = "redis")]
    pub use crate::redis_session::RedisSessionStore;
}
