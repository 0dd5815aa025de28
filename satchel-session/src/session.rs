//! The session entity handed to request handlers.

use crate::codec::{self, Fields};
use crate::error::{SessionError, SessionResult};
use crate::identifier::IdentifierResolver;
use satchel_core::CookieJar;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Mutable property bag for one request.
///
/// User data lives in `fields`. The origin flag and the cached encoding are
/// separate members, so they can never collide with a user key and are never
/// part of the record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    fields: Fields,
    is_new: bool,
    cached: Option<String>,
}

impl Session {
    /// Empty session that has no stored record behind it.
    pub fn new() -> Self {
        Self {
            is_new: true,
            ..Self::default()
        }
    }

    /// Session seeded from decoded or assigned fields.
    pub fn from_fields(fields: Fields) -> Self {
        Self {
            fields,
            is_new: false,
            cached: None,
        }
    }

    pub(crate) fn with_origin(mut self, is_new: bool) -> Self {
        self.is_new = is_new;
        self
    }

    /// True when no stored record existed for this request.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a value converted to `T`; `None` if missing or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.fields
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a value in the session data.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> SessionResult<()> {
        let value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.insert(key, value);
        Ok(())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.cached = None;
        self.fields.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.cached = None;
        self.fields.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Remove every field. The session stays alive and is saved empty.
    pub fn clear(&mut self) {
        self.cached = None;
        self.fields.clear();
    }

    /// Number of user-visible fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether any field has been set.
    pub fn populated(&self) -> bool {
        self.len() != 0
    }

    /// The user-visible field map.
    pub fn to_record(&self) -> &Fields {
        &self.fields
    }

    /// Compare the current fields with the record loaded at the start of the
    /// request. A session with no original record always counts as changed.
    /// The fresh encoding is kept for [`save`](Self::save).
    pub fn changed(&mut self, original: Option<&str>) -> SessionResult<bool> {
        let encoded = codec::encode(&self.fields)?;
        let changed = original != Some(encoded.as_str());
        self.cached = Some(encoded);
        Ok(changed)
    }

    /// Return the record to store and re-advertise the identifier cookie.
    pub fn save(
        &mut self,
        resolver: &IdentifierResolver,
        jar: &dyn CookieJar,
        identifier: &str,
    ) -> SessionResult<String> {
        let encoded = match self.cached.take() {
            Some(encoded) => encoded,
            None => codec::encode(&self.fields)?,
        };
        resolver.persist(jar, identifier);
        self.cached = Some(encoded.clone());
        Ok(encoded)
    }
}

impl From<Fields> for Session {
    fn from(fields: Fields) -> Self {
        Self::from_fields(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_core::{CookieOptions, Cookies};
    use serde_json::json;

    fn loaded(value: Value) -> (Session, String) {
        let Value::Object(fields) = value else {
            panic!("expected an object");
        };
        let record = codec::encode(&fields).unwrap();
        (Session::from_fields(fields), record)
    }

    #[test]
    fn test_new_session() {
        let session = Session::new();
        assert!(session.is_new());
        assert_eq!(session.len(), 0);
        assert!(!session.populated());
    }

    #[test]
    fn test_typed_access() {
        let mut session = Session::new();
        session.set("user_id", 123).unwrap();
        session.set("name", "alice").unwrap();

        assert_eq!(session.get_as::<i32>("user_id"), Some(123));
        assert_eq!(session.get_as::<String>("name"), Some("alice".to_string()));
        assert_eq!(session.get_as::<i32>("name"), None);
        assert!(session.contains("user_id"));
        assert_eq!(session.len(), 2);
        assert!(session.populated());
    }

    #[test]
    fn test_record_excludes_transient_state() {
        let mut session = Session::new();
        session.set("user", 1).unwrap();
        session.changed(None).unwrap();

        let record = session.to_record();
        assert_eq!(record.len(), 1);
        assert_eq!(codec::encode(record).unwrap(), codec::encode(&session.fields).unwrap());
        assert!(!codec::decode(&codec::encode(record).unwrap()).unwrap().contains_key("is_new"));
    }

    #[test]
    fn test_user_keys_do_not_collide_with_transient_state() {
        let mut session = Session::new();
        session.insert("is_new", json!("user data"));
        session.insert("cached", json!(false));

        assert!(session.is_new());
        assert_eq!(session.get("is_new"), Some(&json!("user data")));
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn test_changed_without_original() {
        let mut session = Session::new();
        assert!(session.changed(None).unwrap());
    }

    #[test]
    fn test_unchanged_loaded_session() {
        let (mut session, record) = loaded(json!({"user": 1, "cart": [1, 2]}));
        let _ = session.get("user");
        assert!(!session.changed(Some(&record)).unwrap());
    }

    #[test]
    fn test_mutation_is_detected() {
        let (mut session, record) = loaded(json!({"user": 1}));
        session.set("user", 2).unwrap();
        assert!(session.changed(Some(&record)).unwrap());
    }

    #[test]
    fn test_set_then_restore_is_unchanged() {
        let (mut session, record) = loaded(json!({"user": 1}));
        session.set("user", 2).unwrap();
        session.set("user", 1).unwrap();
        assert!(!session.changed(Some(&record)).unwrap());
    }

    #[test]
    fn test_save_returns_encoding_and_sets_cookie() {
        let jar = Cookies::parse("", None);
        let resolver = IdentifierResolver::new("koa:sess", CookieOptions::default());

        let mut session = Session::new();
        session.set("user", 1).unwrap();
        assert!(session.changed(None).unwrap());

        let record = session.save(&resolver, &jar, "sid-1").unwrap();
        assert_eq!(record, "eyJ1c2VyIjoxfQ==");
        assert!(jar.pending()[0].starts_with("koa:sess=sid-1;"));
    }

    #[test]
    fn test_save_after_mutation_uses_fresh_encoding() {
        let jar = Cookies::parse("", None);
        let resolver = IdentifierResolver::new("koa:sess", CookieOptions::default());

        let mut session = Session::new();
        session.changed(None).unwrap();
        session.set("user", 1).unwrap();

        let record = session.save(&resolver, &jar, "sid-1").unwrap();
        assert_eq!(codec::decode(&record).unwrap().get("user"), Some(&json!(1)));
    }
}
