//! Request-scoped session state and the finalize decision.
//!
//! The middleware creates one [`SessionContext`] per request and stores it in
//! the request extensions. Handlers read and replace the session through it;
//! after the handler returns, the middleware calls
//! [`finalize`](SessionContext::finalize) exactly once to decide between
//! doing nothing, deleting the record, or saving it.

use crate::codec::Fields;
use crate::error::{SessionError, SessionResult};
use crate::identifier::IdentifierResolver;
use crate::session::Session;
use crate::store::SessionStore;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use satchel_core::{CookieJar, HttpRequest};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Where the session at the start of the request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// No usable record: missing cookie, store miss, store error or a
    /// malformed record.
    New,
    /// Decoded from a stored record.
    Loaded,
}

/// What the handler has done with the session so far.
#[derive(Debug)]
enum Slot {
    /// Never read or assigned; holds the session prepared at load time.
    NotAccessed(Session),
    /// Read, mutated or replaced.
    Active(Session),
    /// Explicitly cleared.
    Cleared,
    /// Finalize has run; nothing is reachable any more.
    Finalized,
}

impl Slot {
    fn activate(&mut self) {
        let slot = std::mem::replace(self, Slot::Finalized);
        *self = match slot {
            Slot::NotAccessed(session) => Slot::Active(session),
            other => other,
        };
    }

    fn active_mut(&mut self) -> Option<&mut Session> {
        match self {
            Slot::Active(session) => Some(session),
            _ => None,
        }
    }
}

/// Result of the finalize step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalize {
    /// No store call and no cookie written.
    NoOp,
    /// Cookie cleared and record deleted.
    Deleted,
    /// Record written and cookie refreshed.
    Saved,
}

#[derive(Debug)]
struct State {
    identifier: String,
    origin: Origin,
    original: Option<String>,
    slot: Slot,
}

/// Cheaply cloneable handle to the current request's session.
///
/// Clones share state. The lock inside is only held for the duration of a
/// single accessor call or guard; never hold a guard across an `.await`.
#[derive(Debug, Clone)]
pub struct SessionContext {
    state: Arc<Mutex<State>>,
}

impl SessionContext {
    /// A context whose session has no stored record behind it.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self::build(identifier.into(), Origin::New, None, Session::new())
    }

    /// A context for a session loaded from the store. `original` is the
    /// canonical encoding of `fields`, used by change detection.
    pub fn loaded(identifier: impl Into<String>, fields: Fields, original: String) -> Self {
        Self::build(
            identifier.into(),
            Origin::Loaded,
            Some(original),
            Session::from_fields(fields),
        )
    }

    fn build(identifier: String, origin: Origin, original: Option<String>, session: Session) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                identifier,
                origin,
                original,
                slot: Slot::NotAccessed(session),
            })),
        }
    }

    /// The identifier for this request. Fixed for the request's lifetime.
    pub fn identifier(&self) -> String {
        self.state.lock().identifier.clone()
    }

    pub fn origin(&self) -> Origin {
        self.state.lock().origin
    }

    /// Whether the handler has read or assigned the session.
    pub fn is_accessed(&self) -> bool {
        !matches!(self.state.lock().slot, Slot::NotAccessed(_))
    }

    /// Borrow the session mutably.
    ///
    /// Returns `None` after the session was cleared or finalized. The first
    /// call marks the session as accessed.
    ///
    /// The guard holds the context lock. Drop it before calling any other
    /// method on this context, including [`set_session`](Self::set_session),
    /// [`replace`](Self::replace) or [`clear`](Self::clear): the lock is not
    /// reentrant and the call would block forever. Prefer
    /// [`with_session`](Self::with_session), which releases the lock before
    /// returning.
    pub fn session(&self) -> Option<MappedMutexGuard<'_, Session>> {
        let mut state = self.state.lock();
        state.slot.activate();
        MutexGuard::try_map(state, |state| state.slot.active_mut()).ok()
    }

    /// Run `f` against the session, if there is one.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.session().map(|mut session| f(&mut *session))
    }

    /// Assign the session from a JSON value.
    ///
    /// `null` clears it, an object replaces it, anything else is rejected
    /// with [`SessionError::InvalidAssignment`].
    pub fn set_session(&self, value: Value) -> SessionResult<()> {
        match value {
            Value::Null => self.clear(),
            Value::Object(fields) => self.replace(Session::from_fields(fields)),
            other => Err(SessionError::InvalidAssignment(format!(
                "session must be null or an object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Replace the session with `session`.
    pub fn replace(&self, session: Session) -> SessionResult<()> {
        let mut state = self.state.lock();
        if matches!(state.slot, Slot::Finalized) {
            return Err(SessionError::InvalidAssignment("session already finalized".into()));
        }
        let is_new = state.origin == Origin::New;
        state.slot = Slot::Active(session.with_origin(is_new));
        Ok(())
    }

    /// Mark the session for deletion.
    pub fn clear(&self) -> SessionResult<()> {
        let mut state = self.state.lock();
        if matches!(state.slot, Slot::Finalized) {
            return Err(SessionError::InvalidAssignment("session already finalized".into()));
        }
        state.slot = Slot::Cleared;
        Ok(())
    }

    /// Persist, delete or ignore the session. Runs its decision once; later
    /// calls return [`Finalize::NoOp`].
    pub async fn finalize<S>(
        &self,
        store: &S,
        resolver: &IdentifierResolver,
        jar: &dyn CookieJar,
    ) -> SessionResult<Finalize>
    where
        S: SessionStore + ?Sized,
    {
        let (identifier, origin, original, slot) = {
            let mut state = self.state.lock();
            let slot = std::mem::replace(&mut state.slot, Slot::Finalized);
            (
                state.identifier.clone(),
                state.origin,
                state.original.take(),
                slot,
            )
        };

        let mut session = match slot {
            Slot::NotAccessed(_) | Slot::Finalized => return Ok(Finalize::NoOp),
            Slot::Cleared => {
                resolver.clear(jar);
                store
                    .delete(&identifier)
                    .await
                    .map_err(SessionError::into_write_failure)?;
                debug!("Session deleted");
                return Ok(Finalize::Deleted);
            }
            Slot::Active(session) => session,
        };

        if origin == Origin::New && !session.populated() {
            return Ok(Finalize::NoOp);
        }

        if !session.changed(original.as_deref())? {
            return Ok(Finalize::NoOp);
        }

        let record = session.save(resolver, jar, &identifier)?;
        store
            .save(&identifier, &record)
            .await
            .map_err(SessionError::into_write_failure)?;
        debug!(fields = session.len(), "Session saved");
        Ok(Finalize::Saved)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Session access from a request.
pub trait RequestSessionExt {
    /// The session context installed by the session middleware.
    fn session_context(&self) -> Option<&SessionContext>;

    /// Shorthand for `session_context()` then
    /// [`SessionContext::set_session`].
    fn set_session(&self, value: Value) -> SessionResult<()> {
        self.session_context()
            .ok_or_else(|| SessionError::Config("session middleware is not installed".into()))?
            .set_session(value)
    }
}

impl RequestSessionExt for HttpRequest {
    fn session_context(&self) -> Option<&SessionContext> {
        self.extensions.get::<SessionContext>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::store::MemorySessionStore;
    use satchel_core::{CookieOptions, Cookies};
    use serde_json::json;

    fn resolver() -> IdentifierResolver {
        IdentifierResolver::new("koa:sess", CookieOptions::default())
    }

    fn loaded(identifier: &str, value: Value) -> SessionContext {
        let Value::Object(fields) = value else {
            panic!("expected an object");
        };
        let record = codec::encode(&fields).unwrap();
        SessionContext::loaded(identifier, fields, record)
    }

    #[test]
    fn test_untouched_is_not_accessed() {
        let ctx = SessionContext::new("sid");
        assert!(!ctx.is_accessed());
        assert_eq!(ctx.origin(), Origin::New);
        assert_eq!(ctx.identifier(), "sid");
    }

    #[test]
    fn test_reading_marks_accessed() {
        let ctx = loaded("sid", json!({"user": 1}));
        let user = ctx.with_session(|s| s.get_as::<i32>("user")).flatten();
        assert_eq!(user, Some(1));
        assert!(ctx.is_accessed());
    }

    #[test]
    fn test_guard_mutation() {
        let ctx = SessionContext::new("sid");
        ctx.session().unwrap().set("user", 1).unwrap();
        assert_eq!(ctx.session().unwrap().len(), 1);
    }

    #[test]
    fn test_assign_after_guard_released() {
        let ctx = SessionContext::new("sid");
        let count = ctx.with_session(|s| {
            s.insert("draft", json!(true));
            s.len()
        });
        assert_eq!(count, Some(1));

        ctx.set_session(json!({"user": 1})).unwrap();
        {
            let session = ctx.session().unwrap();
            assert!(!session.contains("draft"));
        }
        ctx.clear().unwrap();
        assert!(ctx.session().is_none());
    }

    #[test]
    fn test_cleared_reads_none() {
        let ctx = loaded("sid", json!({"user": 1}));
        ctx.set_session(Value::Null).unwrap();
        assert!(ctx.session().is_none());
        assert!(ctx.is_accessed());
    }

    #[test]
    fn test_replace_with_object() {
        let ctx = loaded("sid", json!({"user": 1}));
        ctx.set_session(json!({"user": 2, "admin": true})).unwrap();

        let session = ctx.session().unwrap();
        assert_eq!(session.get("user"), Some(&json!(2)));
        assert_eq!(session.len(), 2);
        assert!(!session.is_new());
    }

    #[test]
    fn test_replace_keeps_new_origin() {
        let ctx = SessionContext::new("sid");
        ctx.set_session(json!({"user": 1})).unwrap();
        assert!(ctx.session().unwrap().is_new());
    }

    #[test]
    fn test_replace_after_clear_revives() {
        let ctx = loaded("sid", json!({"user": 1}));
        ctx.set_session(Value::Null).unwrap();
        ctx.set_session(json!({"user": 3})).unwrap();
        assert_eq!(ctx.session().unwrap().get("user"), Some(&json!(3)));
    }

    #[test]
    fn test_invalid_assignments() {
        let ctx = SessionContext::new("sid");
        for value in [json!(42), json!("user"), json!([1, 2]), json!(true)] {
            assert!(matches!(
                ctx.set_session(value),
                Err(SessionError::InvalidAssignment(_))
            ));
        }
        assert!(!ctx.is_accessed());
    }

    #[tokio::test]
    async fn test_finalize_untouched_is_noop() {
        let store = MemorySessionStore::new();
        let jar = Cookies::parse("", None);
        let ctx = loaded("sid", json!({"user": 1}));

        let outcome = ctx.finalize(&store, &resolver(), &jar).await.unwrap();
        assert_eq!(outcome, Finalize::NoOp);
        assert!(jar.pending().is_empty());
    }

    #[tokio::test]
    async fn test_finalize_empty_new_is_noop() {
        let store = MemorySessionStore::new();
        let jar = Cookies::parse("", None);
        let ctx = SessionContext::new("sid");
        let _ = ctx.session();

        let outcome = ctx.finalize(&store, &resolver(), &jar).await.unwrap();
        assert_eq!(outcome, Finalize::NoOp);
        assert!(store.is_empty().await);
        assert!(jar.pending().is_empty());
    }

    #[tokio::test]
    async fn test_finalize_saves_new_session() {
        let store = MemorySessionStore::new();
        let jar = Cookies::parse("", None);
        let ctx = SessionContext::new("sid");
        ctx.with_session(|s| s.set("user", 1)).unwrap().unwrap();

        let outcome = ctx.finalize(&store, &resolver(), &jar).await.unwrap();
        assert_eq!(outcome, Finalize::Saved);
        assert_eq!(store.load("sid").await.unwrap().as_deref(), Some("eyJ1c2VyIjoxfQ=="));
        assert!(jar.pending()[0].starts_with("koa:sess=sid;"));
    }

    #[tokio::test]
    async fn test_finalize_read_only_is_noop() {
        let store = MemorySessionStore::new();
        let jar = Cookies::parse("", None);
        let ctx = loaded("sid", json!({"user": 1}));
        let _ = ctx.with_session(|s| s.get("user").cloned());

        let outcome = ctx.finalize(&store, &resolver(), &jar).await.unwrap();
        assert_eq!(outcome, Finalize::NoOp);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_finalize_clear_deletes() {
        let store = MemorySessionStore::new();
        store.save("sid", "eyJ1c2VyIjoxfQ==").await.unwrap();
        let jar = Cookies::parse("", None);
        let ctx = loaded("sid", json!({"user": 1}));
        ctx.clear().unwrap();

        let outcome = ctx.finalize(&store, &resolver(), &jar).await.unwrap();
        assert_eq!(outcome, Finalize::Deleted);
        assert!(store.is_empty().await);
        assert!(jar.pending()[0].starts_with("koa:sess=;"));
    }

    #[tokio::test]
    async fn test_finalize_runs_once() {
        let store = MemorySessionStore::new();
        let jar = Cookies::parse("", None);
        let ctx = SessionContext::new("sid");
        ctx.with_session(|s| s.set("user", 1)).unwrap().unwrap();

        assert_eq!(ctx.finalize(&store, &resolver(), &jar).await.unwrap(), Finalize::Saved);
        assert_eq!(ctx.finalize(&store, &resolver(), &jar).await.unwrap(), Finalize::NoOp);
        assert!(ctx.session().is_none());
        assert!(ctx.set_session(json!({})).is_err());
    }

    #[test]
    fn test_request_extension() {
        let mut req = HttpRequest::new("GET", "/");
        assert!(req.session_context().is_none());
        assert!(matches!(req.set_session(Value::Null), Err(SessionError::Config(_))));

        let ctx = SessionContext::new("sid");
        req.extensions.insert(ctx.clone());
        req.set_session(json!({"user": 1})).unwrap();

        assert_eq!(ctx.session().unwrap().get("user"), Some(&json!(1)));
    }
}
