//! Session identifier cookie handling.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use satchel_core::{CookieJar, CookieOptions};

/// Bytes of entropy in a generated identifier.
pub const IDENTIFIER_BYTES: usize = 24;

/// Reads, issues and writes the identifier cookie.
#[derive(Debug, Clone)]
pub struct IdentifierResolver {
    key: String,
    options: CookieOptions,
}

impl IdentifierResolver {
    pub fn new(key: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            key: key.into(),
            options,
        }
    }

    /// Cookie name.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    /// Identifier carried by the request, if present and verified.
    pub fn resolve(&self, jar: &dyn CookieJar) -> Option<String> {
        jar.get(&self.key, &self.options)
            .filter(|identifier| !identifier.is_empty())
    }

    /// Generate a fresh identifier: 24 random bytes, URL-safe base64.
    pub fn issue(&self) -> String {
        let mut bytes = [0u8; IDENTIFIER_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Write or refresh the identifier cookie.
    pub fn persist(&self, jar: &dyn CookieJar, identifier: &str) {
        jar.set(&self.key, Some(identifier), &self.options);
    }

    /// Expire the identifier cookie on the client.
    pub fn clear(&self, jar: &dyn CookieJar) {
        jar.set(&self.key, None, &self.options);
    }
}
