//! Route table entries and the per-request context handed to handlers.

use axum::{
    body::Body,
    http::{Method, Request},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::matcher::REPO_PARAM;

/// Traffic class of a route, threaded through to instrumentation.
///
/// The router never enforces anything based on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Content-serving traffic (index, packages, read API)
    Read,
    /// Artifact mutations (uploads, deletes)
    Write,
    /// Operational endpoints (health, metrics)
    System,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Read => "READ",
            Classification::Write => "WRITE",
            Classification::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters captured while matching, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Value of the first parameter called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Everything a handler gets for one matched request.
pub struct RouteContext {
    /// The inbound request. Its extensions also carry [`Params`] and [`Classification`].
    pub request: Request<Body>,
    pub params: Params,
    pub classification: Classification,
    /// Template the request matched, as registered.
    pub template: Arc<str>,
}

impl RouteContext {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Repository path captured by the variadic segment, `""` at depth 0.
    pub fn repo(&self) -> &str {
        self.params.get(REPO_PARAM).unwrap_or("")
    }
}

type BoxedHandler = dyn Fn(RouteContext) -> BoxFuture<'static, Response> + Send + Sync;

/// Type-erased async request handler.
#[derive(Clone)]
pub struct Handler(Arc<BoxedHandler>);

impl Handler {
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(RouteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        Self(Arc::new(move |ctx| {
            let fut = f(ctx);
            Box::pin(async move { fut.await.into_response() })
        }))
    }

    pub(crate) fn call(&self, ctx: RouteContext) -> BoxFuture<'static, Response> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// One entry of the route table.
#[derive(Debug, Clone)]
pub struct Route {
    pub classification: Classification,
    pub method: Method,
    pub path: String,
    pub handler: Handler,
}

impl Route {
    pub fn new(
        classification: Classification,
        method: Method,
        path: impl Into<String>,
        handler: Handler,
    ) -> Self {
        Self {
            classification,
            method,
            path: path.into(),
            handler,
        }
    }
}
