//! Redis session storage implementation.

use crate::config::StoreConfig;
use crate::error::{SessionError, SessionResult};
use crate::store::SessionStore;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

/// Redis-backed session store.
///
/// One [`ConnectionManager`] is shared by every request; each call works on a
/// cheap clone of it, so concurrent requests never wait on each other here.
///
/// Records are written with a plain `SET`. The configured `ttl` is reported
/// but not applied, so records persist until deleted or evicted by Redis.
///
/// # Examples
///
/// ```no_run
/// use satchel_session::{RedisSessionStore, SessionStore, StoreConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = StoreConfig::new()
///         .with_host("127.0.0.1")
///         .with_port(6379)
///         .with_db(2);
///
///     let store = RedisSessionStore::new(config).await?;
///     store.save("sid", "e30=").await?;
///     Ok(())
/// }
/// ```
pub struct RedisSessionStore {
    conn: ConnectionManager,
    config: StoreConfig,
}

impl RedisSessionStore {
    /// Connect using `config`.
    pub async fn new(config: StoreConfig) -> SessionResult<Self> {
        let url = config.connection_url()?;
        let client =
            redis::Client::open(url.as_str()).map_err(|e| SessionError::InvalidUrl(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?;

        info!(
            host = %config.host,
            port = config.port,
            db = config.db,
            ttl_secs = ?config.ttl.map(|ttl| ttl.as_secs()),
            prefix = %config.options.prefix,
            "Redis session store connected"
        );

        Ok(Self { conn, config })
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn store_key(&self, identifier: &str) -> String {
        self.config.store_key(identifier)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, identifier: &str) -> SessionResult<Option<String>> {
        let mut conn = self.conn.clone();
        let record: Option<String> = conn
            .get(self.store_key(identifier))
            .await
            .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?;

        debug!(hit = record.is_some(), "Redis session lookup");
        Ok(record)
    }

    async fn save(&self, identifier: &str, record: &str) -> SessionResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(self.store_key(identifier), record)
            .await
            .map_err(|e| SessionError::StoreWrite(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, identifier: &str) -> SessionResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(self.store_key(identifier))
            .await
            .map_err(|e| SessionError::StoreWrite(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_accepts_generated_url() {
        let config = StoreConfig::new().with_db(5).with_auth(None, "pw");
        let url = config.connection_url().unwrap();
        assert!(redis::Client::open(url.as_str()).is_ok());
    }

    #[tokio::test]
    async fn test_bad_host_fails_before_connecting() {
        let config = StoreConfig::new().with_host("");
        let result = RedisSessionStore::new(config).await;
        assert!(matches!(result, Err(SessionError::InvalidUrl(_))));
    }
}
