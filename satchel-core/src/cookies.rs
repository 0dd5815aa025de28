//! Cookie jar collaborator.
//!
//! [`CookieJar`] is the minimal get/set contract middleware relies on.
//! [`Cookies`] implements it over the request's `Cookie` header and collects
//! outgoing `Set-Cookie` lines until they are written onto the response.
//!
//! Signed cookies follow the companion-cookie scheme: setting `name` also
//! sets `name.sig`, an HMAC-SHA256 over `name=value`. Reading a signed cookie
//! returns nothing unless a configured key verifies the signature.

use crate::HttpResponse;
use crate::logging::warn;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_SUFFIX: &str = ".sig";
const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes applied when reading and writing a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    pub max_age: Option<Duration>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    /// Replace earlier `Set-Cookie` lines for the same name in this response
    pub overwrite: bool,
    /// Sign on write, verify on read
    pub signed: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: Some("/".to_string()),
            domain: None,
            max_age: None,
            secure: false,
            http_only: true,
            same_site: None,
            overwrite: false,
            signed: false,
        }
    }
}

impl CookieOptions {
    /// Render the `Set-Cookie` value for `name=value`.
    fn serialize(&self, name: &str, value: &str, expire: bool) -> String {
        let mut cookie = format!("{}={}", name, value);

        if let Some(path) = &self.path {
            let _ = write!(cookie, "; Path={}", path);
        }
        if let Some(domain) = &self.domain {
            let _ = write!(cookie, "; Domain={}", domain);
        }

        if expire {
            let _ = write!(cookie, "; Expires={}", EXPIRED);
        } else if let Some(max_age) = self.max_age {
            let expires = httpdate::fmt_http_date(SystemTime::now() + max_age);
            let _ = write!(cookie, "; Max-Age={}; Expires={}", max_age.as_secs(), expires);
        }

        if self.secure {
            cookie.push_str("; Secure");
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            let _ = write!(cookie, "; SameSite={}", same_site.as_str());
        }

        cookie
    }
}

/// Signing keys. The first key signs; every key is accepted on verification,
/// so keys can be rotated by prepending a new one.
#[derive(Clone)]
pub struct Keys {
    keys: Vec<Vec<u8>>,
}

impl Keys {
    pub fn new<K: Into<Vec<u8>>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Sign `data` with the first key. `None` when there are no keys.
    pub fn sign(&self, data: &str) -> Option<String> {
        let key = self.keys.first()?;
        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(data.as_bytes());
        Some(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Check `signature` against every key in constant time.
    pub fn verify(&self, data: &str, signature: &str) -> bool {
        let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };

        self.keys.iter().any(|key| {
            HmacSha256::new_from_slice(key)
                .map(|mut mac| {
                    mac.update(data.as_bytes());
                    mac.verify_slice(&signature).is_ok()
                })
                .unwrap_or(false)
        })
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys").field("count", &self.keys.len()).finish()
    }
}

/// Read/write access to cookies for the current request.
pub trait CookieJar: Send + Sync {
    /// Value of the named request cookie, verified when `options.signed`.
    fn get(&self, name: &str, options: &CookieOptions) -> Option<String>;

    /// Queue a cookie on the response. `None` expires it on the client.
    fn set(&self, name: &str, value: Option<&str>, options: &CookieOptions);
}

/// Header-backed [`CookieJar`].
///
/// Clones share the outgoing queue, so a jar stored in request extensions
/// and the copy held by middleware see the same writes.
#[derive(Debug, Clone)]
pub struct Cookies {
    incoming: Arc<HashMap<String, String>>,
    outgoing: Arc<Mutex<Vec<(String, String)>>>,
    keys: Option<Arc<Keys>>,
}

impl Cookies {
    /// Parse a `Cookie` header value (`a=1; b=2`).
    ///
    /// When a name repeats, the first occurrence wins; browsers send the
    /// cookie with the most specific path first.
    pub fn parse(header: &str, keys: Option<Arc<Keys>>) -> Self {
        let mut incoming = HashMap::new();
        for pair in header.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            incoming
                .entry(name.to_string())
                .or_insert_with(|| value.trim().trim_matches('"').to_string());
        }

        Self {
            incoming: Arc::new(incoming),
            outgoing: Arc::new(Mutex::new(Vec::new())),
            keys,
        }
    }

    /// Build a jar from the request's `Cookie` header.
    pub fn from_request(req: &crate::HttpRequest, keys: Option<Arc<Keys>>) -> Self {
        Self::parse(req.header("Cookie").map(String::as_str).unwrap_or(""), keys)
    }

    /// Raw request cookie, without signature checks.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.incoming.get(name).map(String::as_str)
    }

    /// Serialized `Set-Cookie` values queued so far.
    pub fn pending(&self) -> Vec<String> {
        self.outgoing
            .lock()
            .iter()
            .map(|(_, header)| header.clone())
            .collect()
    }

    /// Move queued `Set-Cookie` values onto `response`.
    pub fn apply(&self, response: &mut HttpResponse) {
        for (_, header) in self.outgoing.lock().drain(..) {
            response.add_cookie(header);
        }
    }

    fn push(&self, name: &str, header: String, overwrite: bool) {
        let mut outgoing = self.outgoing.lock();
        if overwrite {
            outgoing.retain(|(existing, _)| existing != name);
        }
        outgoing.push((name.to_string(), header));
    }
}

impl CookieJar for Cookies {
    fn get(&self, name: &str, options: &CookieOptions) -> Option<String> {
        let value = self.incoming.get(name)?;
        if !options.signed {
            return Some(value.clone());
        }

        let keys = self.keys.as_ref()?;
        let signature = self.incoming.get(&format!("{name}{SIGNATURE_SUFFIX}"))?;
        keys.verify(&format!("{name}={value}"), signature)
            .then(|| value.clone())
    }

    fn set(&self, name: &str, value: Option<&str>, options: &CookieOptions) {
        let expire = value.is_none();
        let value = value.unwrap_or("");
        self.push(name, options.serialize(name, value, expire), options.overwrite);

        if !options.signed {
            return;
        }

        let sig_name = format!("{name}{SIGNATURE_SUFFIX}");
        let signature = if expire {
            Some(String::new())
        } else {
            self.keys
                .as_ref()
                .and_then(|keys| keys.sign(&format!("{name}={value}")))
        };

        match signature {
            Some(signature) => self.push(
                &sig_name,
                options.serialize(&sig_name, &signature, expire),
                options.overwrite,
            ),
            None => warn!(cookie = %name, "signed cookie requested but no signing keys configured"),
        }
    }
}
