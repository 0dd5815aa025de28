// Core library for satchel
// Request/response types, the middleware chain, and the collaborators
// (cookies, logging) that session middleware plugs into.

pub mod cookies;
pub mod error;
pub mod extensions;
pub mod http;
pub mod logging;
pub mod middleware;

// Re-export commonly used types
pub use cookies::*;
pub use error::*;
pub use extensions::*;
pub use http::*;
pub use middleware::*;
