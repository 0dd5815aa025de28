// Middleware chain for request/response processing

use crate::logging::{debug, trace};
use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by handlers and by `Next`
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>;

/// The rest of the chain, called at most once by a middleware
pub type Next = Box<dyn FnOnce(HttpRequest) -> BoxFuture + Send>;

/// Terminal request handler
pub type HandlerFn = Arc<dyn Fn(HttpRequest) -> BoxFuture + Send + Sync>;

/// Wrap an async closure as a [`HandlerFn`].
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// Middleware wraps the rest of the chain.
///
/// An implementation may act before calling `next`, after it returns, or
/// both; it owns the decision of what to do with the downstream result.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

#[async_trait]
impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        (**self).handle(req, next).await
    }
}

/// Ordered middleware stack; the first middleware added runs outermost.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        let mut mws = (*self.middlewares).clone();
        mws.push(Arc::new(middleware));
        self.middlewares = Arc::new(mws);
    }

    /// Builder form of [`use_middleware`](Self::use_middleware)
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.use_middleware(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run `req` through every middleware and finally `handler`
    pub async fn apply(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler).await
    }

    fn execute_from(&self, index: usize, req: HttpRequest, handler: HandlerFn) -> BoxFuture {
        let Some(middleware) = self.middlewares.get(index).cloned() else {
            trace!("Middleware chain complete, calling handler");
            return handler(req);
        };

        let chain = self.clone();
        trace!(middleware_index = index, "Executing middleware");
        Box::pin(async move {
            middleware
                .handle(
                    req,
                    Box::new(move |req| chain.execute_from(index + 1, req, handler)),
                )
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Tag {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
            self.log.lock().push(format!("enter {}", self.name));
            let result = next(req).await;
            self.log.lock().push(format!("leave {}", self.name));
            result
        }
    }

    #[tokio::test]
    async fn test_chain_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new()
            .with(Tag { name: "outer", log: log.clone() })
            .with(Tag { name: "inner", log: log.clone() });

        let handler_log = log.clone();
        let response = chain
            .apply(
                HttpRequest::new("GET", "/"),
                handler(move |_req| {
                    let log = handler_log.clone();
                    async move {
                        log.lock().push("handler".to_string());
                        Ok(HttpResponse::ok())
                    }
                }),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(
            *log.lock(),
            vec!["enter outer", "enter inner", "handler", "leave inner", "leave outer"]
        );
    }

    #[tokio::test]
    async fn test_handler_error_passes_through() {
        let chain = MiddlewareChain::new().with(Tag {
            name: "only",
            log: Arc::new(Mutex::new(Vec::new())),
        });

        let result = chain
            .apply(
                HttpRequest::new("GET", "/"),
                handler(|_req| async { Err(Error::Forbidden("denied".to_string())) }),
            )
            .await;

        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_empty_chain_calls_handler() {
        let chain = MiddlewareChain::new();
        assert!(chain.is_empty());

        let response = chain
            .apply(
                HttpRequest::new("GET", "/"),
                handler(|_req| async { Ok(HttpResponse::no_content()) }),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 204);
    }
}
