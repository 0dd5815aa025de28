//! Session configuration.

use crate::error::{SessionError, SessionResult};
use satchel_core::{CookieOptions, Keys, SameSite};
use std::sync::Arc;
use std::time::Duration;

/// Default cookie name carrying the session identifier.
pub const DEFAULT_KEY: &str = "koa:sess";

/// Middleware configuration: which cookie carries the identifier and how it
/// is written.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cookie name
    pub key: String,
    /// Attributes passed through to the cookie jar
    pub cookie: CookieOptions,
    /// Signing keys for signed cookies; the first key signs
    pub keys: Vec<Vec<u8>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            cookie: Self::cookie_defaults(),
            keys: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cookie attributes used unless explicitly overridden: `overwrite`,
    /// `http_only` and `signed` are all on.
    pub fn cookie_defaults() -> CookieOptions {
        CookieOptions {
            overwrite: true,
            http_only: true,
            signed: true,
            ..Default::default()
        }
    }

    /// Set the cookie name.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Replace the cookie attributes wholesale.
    pub fn with_cookie(mut self, cookie: CookieOptions) -> Self {
        self.cookie = cookie;
        self
    }

    /// Add a signing key. Call repeatedly to rotate: the first key added signs.
    pub fn with_signing_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.keys.push(key.into());
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.cookie.signed = signed;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.cookie.http_only = http_only;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.cookie.overwrite = overwrite;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.cookie.secure = secure;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie.same_site = Some(same_site);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.cookie.path = Some(path.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie.domain = Some(domain.into());
        self
    }

    /// Browser-side lifetime of the identifier cookie.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.cookie.max_age = Some(max_age);
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> SessionResult<()> {
        if self.key.is_empty() {
            return Err(SessionError::Config("cookie key must not be empty".into()));
        }
        if self.cookie.signed && self.keys.is_empty() {
            return Err(SessionError::Config(
                "signed session cookies require at least one signing key".into(),
            ));
        }
        Ok(())
    }

    /// Signing keys in the form the cookie jar expects.
    pub fn signing_keys(&self) -> Option<Arc<Keys>> {
        (!self.keys.is_empty()).then(|| Arc::new(Keys::new(self.keys.iter().cloned())))
    }
}

/// Connection options forwarded to the store client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Username for Redis 6+ ACL
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connect with `rediss://`
    pub tls: bool,
    /// Prepended to every identifier to form the store key
    pub prefix: String,
}

/// Store connection configuration. Fixed once the store is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub options: StoreOptions,
    /// Database index
    pub db: u32,
    /// Accepted and reported, not applied to writes
    pub ttl: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            options: StoreOptions::default(),
            db: 0,
            ttl: None,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Set credentials. `username` may be `None` for password-only auth.
    pub fn with_auth(mut self, username: Option<&str>, password: &str) -> Self {
        self.options.username = username.map(str::to_string);
        self.options.password = Some(password.to_string());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = prefix.into();
        self
    }

    /// Store key for an identifier.
    pub fn store_key(&self, identifier: &str) -> String {
        format!("{}{}", self.options.prefix, identifier)
    }

    /// Redis connection URL including auth and database.
    pub fn connection_url(&self) -> SessionResult<String> {
        if self.host.is_empty() || self.host.contains('/') || self.host.contains('@') {
            return Err(SessionError::InvalidUrl(format!(
                "invalid store host: {:?}",
                self.host
            )));
        }

        let scheme = if self.options.tls { "rediss" } else { "redis" };
        let auth = match (&self.options.username, &self.options.password) {
            (Some(user), Some(password)) => format!("{}:{}@", user, password),
            (None, Some(password)) => format!(":{}@", password),
            (_, None) => String::new(),
        };

        Ok(format!(
            "{}://{}{}:{}/{}",
            scheme, auth, self.host, self.port, self.db
        ))
    }
}
