//! Message handlers and connection middleware.

use crate::client::Client;
use crate::error::RouterError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type HandlerFn =
    dyn Fn(Arc<Client>, Value) -> BoxFuture<'static, Result<(), RouterError>> + Send + Sync;

type MiddlewareFn = dyn Fn(Arc<Client>) -> BoxFuture<'static, Result<(), RouterError>> + Send + Sync;

/// Async handler invoked with a parsed (and validated) client message.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

impl Handler {
    /// Wrap an async function as a handler.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Arc<Client>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RouterError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(
                move |client: Arc<Client>, payload: Value| -> BoxFuture<'static, Result<(), RouterError>> {
                    Box::pin(handler(client, payload))
                },
            ),
        }
    }

    /// Invoke the handler.
    pub fn call(&self, client: Arc<Client>, payload: Value) -> BoxFuture<'static, Result<(), RouterError>> {
        (self.inner)(client, payload)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// Connection hook run once per client before it joins a channel.
///
/// A middleware may reject the connection by returning an error, or by
/// terminating the client, in which case the rest of the chain is skipped.
#[derive(Clone)]
pub struct Middleware {
    inner: Arc<MiddlewareFn>,
}

impl Middleware {
    /// Wrap an async function as a middleware.
    pub fn new<F, Fut>(middleware: F) -> Self
    where
        F: Fn(Arc<Client>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RouterError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(
                move |client: Arc<Client>| -> BoxFuture<'static, Result<(), RouterError>> {
                    Box::pin(middleware(client))
                },
            ),
        }
    }

    /// Invoke the middleware.
    pub fn call(&self, client: Arc<Client>) -> BoxFuture<'static, Result<(), RouterError>> {
        (self.inner)(client)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware(..)")
    }
}
