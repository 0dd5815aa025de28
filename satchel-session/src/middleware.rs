//! Session middleware.

use crate::codec;
use crate::config::SessionConfig;
use crate::context::SessionContext;
use crate::error::SessionResult;
use crate::identifier::IdentifierResolver;
use crate::store::SessionStore;
use async_trait::async_trait;
use satchel_core::{Cookies, Error, HttpRequest, HttpResponse, Keys, Middleware, Next};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Loads the request's session before the handler runs and persists,
/// deletes or ignores it afterwards.
///
/// Finalize runs whether the handler succeeded or failed. A handler error is
/// returned only after finalize completes, so a session change made before
/// the failure is still stored. Store read failures and malformed records
/// degrade to a fresh session; store write failures fail the request.
///
/// Concurrent requests carrying the same identifier are not coordinated: the
/// last one to save wins.
///
/// # Examples
///
/// ```
/// use satchel_core::{HttpRequest, HttpResponse, MiddlewareChain, handler};
/// use satchel_session::{MemorySessionStore, RequestSessionExt, SessionConfig, SessionMiddleware};
///
/// # tokio_test::block_on(async {
/// let config = SessionConfig::new().with_signing_key("a long random secret");
/// let sessions = SessionMiddleware::new(config, MemorySessionStore::new()).unwrap();
///
/// let chain = MiddlewareChain::new().with(sessions);
/// let login = handler(|req: HttpRequest| async move {
///     if let Some(ctx) = req.session_context() {
///         ctx.with_session(|s| s.set("user", 1)).transpose()?;
///     }
///     Ok::<_, satchel_core::Error>(HttpResponse::ok())
/// });
///
/// let response = chain.apply(HttpRequest::new("POST", "/login"), login).await.unwrap();
/// assert!(response.cookies[0].starts_with("koa:sess="));
/// # });
/// ```
pub struct SessionMiddleware<S> {
    store: S,
    resolver: IdentifierResolver,
    keys: Option<Arc<Keys>>,
}

impl<S: SessionStore> SessionMiddleware<S> {
    /// Build the middleware. Fails if `config` does not validate.
    pub fn new(config: SessionConfig, store: S) -> SessionResult<Self> {
        config.validate()?;
        let keys = config.signing_keys();
        debug!(
            key = %config.key,
            signed = config.cookie.signed,
            "Session middleware configured"
        );

        Ok(Self {
            store,
            resolver: IdentifierResolver::new(config.key, config.cookie),
            keys,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> &IdentifierResolver {
        &self.resolver
    }

    /// Resolve the identifier and load the session for this request.
    ///
    /// Only a fatal decode error is returned; everything else falls back to
    /// a new session.
    pub async fn load(&self, jar: &Cookies) -> SessionResult<SessionContext> {
        let Some(identifier) = self.resolver.resolve(jar) else {
            return Ok(SessionContext::new(self.resolver.issue()));
        };

        let record = match self.store.load(&identifier).await {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "Session store read failed, starting a fresh session");
                None
            }
        };

        let Some(record) = record else {
            return Ok(SessionContext::new(identifier));
        };

        match codec::decode(&record) {
            Ok(fields) => {
                // Compare against the canonical form so key order in the stored
                // record never counts as a change.
                let original = codec::encode(&fields)?;
                Ok(SessionContext::loaded(identifier, fields, original))
            }
            Err(err) if err.is_recoverable() => {
                debug!(reason = %err, "Discarding malformed session record");
                Ok(SessionContext::new(identifier))
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl<S: SessionStore + 'static> Middleware for SessionMiddleware<S> {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let jar = Cookies::from_request(&req, self.keys.clone());
        let context = self.load(&jar).await?;

        req.extensions.insert(context.clone());
        req.extensions.insert(jar.clone());

        let outcome = next(req).await;
        let finalized = context.finalize(&self.store, &self.resolver, &jar).await;

        match (outcome, finalized) {
            (Ok(mut response), Ok(result)) => {
                debug!(outcome = ?result, "Session finalized");
                jar.apply(&mut response);
                Ok(response)
            }
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(handler_err), Ok(result)) => {
                debug!(outcome = ?result, "Session finalized after handler error");
                Err(handler_err)
            }
            (Err(handler_err), Err(err)) => {
                error!(error = %err, "Session finalize failed after handler error");
                Err(handler_err)
            }
        }
    }
}

impl<S> std::fmt::Debug for SessionMiddleware<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMiddleware")
            .field("key", &self.resolver.key())
            .field("signed", &self.resolver.options().signed)
            .finish()
    }
}
