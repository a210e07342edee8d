//! # Request Router
//!
//! Resolves request paths against the registered route table. Unlike a plain
//! path router, a route template may contain a `:repo` segment that spans a
//! caller-defined number of path segments (the repository path), so the whole
//! table is matched segment by segment rather than through a fixed-shape trie.
//!
//! ## Resolution
//!
//! 1. Strip the configured context path. Paths outside it are not found,
//!    except the context path itself, which resolves like `/`.
//! 2. Try every route registered for the request method.
//! 3. Among matches, the template with the longest literal prefix wins; ties go
//!    to the route registered first. A repository called `api` or `health`
//!    therefore never shadows the fixed routes.
//! 4. Dispatch with the captured [`Params`]; no match yields 404.
//!
//! ## Metrics
//!
//! With metrics enabled every response is recorded under
//! `(method, classification, template, status)`. The template is rebuilt by
//! [`substitute_captures`] from the positions the parameters were matched at.

mod matcher;
mod route;
mod template;

pub use matcher::{split_path, Capture, CompiledTemplate, REPO_PARAM};
pub use route::{Classification, Handler, Params, Route, RouteContext};
pub use template::{map_url_with_params_back_to_route_template, substitute_captures};

use axum::{
    body::Body,
    http::{HeaderValue, Method, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Path label used for requests that matched no route.
pub const UNMATCHED_PATH_LABEL: &str = "unmatched";

/// Router settings, fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterConfig {
    /// Prefix every route lives beneath, e.g. `/charts`. Empty for none.
    pub context_path: String,
    /// Maximum number of segments the `:repo` parameter may span. 0 disables it.
    pub repo_path_depth: usize,
    /// Record per-request metrics.
    pub metrics_enabled: bool,
}

impl RouterConfig {
    fn normalized_context_path(&self) -> String {
        let trimmed = self.context_path.trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }
}

#[derive(Debug, Clone)]
struct RegisteredRoute {
    route: Route,
    template: CompiledTemplate,
    template_str: Arc<str>,
}

/// Outcome of matching a method and path against the table.
#[derive(Debug)]
pub struct ResolvedRequest<'a> {
    pub route: &'a Route,
    pub params: Params,
    /// Segment positions of `params`, for [`Router::template_label`].
    pub captures: Vec<Capture>,
}

impl ResolvedRequest<'_> {
    /// Captured repository path, `""` when the route has none.
    pub fn repository_path(&self) -> &str {
        self.params.get(REPO_PARAM).unwrap_or("")
    }
}

/// Label set describing one handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLabels {
    pub method: String,
    pub classification: Option<Classification>,
    pub path: String,
}

impl RequestLabels {
    pub fn classification_label(&self) -> &'static str {
        self.classification.map_or("NONE", |c| c.as_str())
    }
}

/// Route table plus the matching algorithm.
#[derive(Debug, Clone)]
pub struct Router {
    config: RouterConfig,
    context_path: String,
    routes: Vec<RegisteredRoute>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        let context_path = config.normalized_context_path();
        Self {
            config,
            context_path,
            routes: Vec::new(),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Replace the whole route table.
    pub fn set_routes(&mut self, routes: Vec<Route>) {
        self.routes.clear();
        for route in routes {
            self.add_route(route);
        }
        debug!(count = self.routes.len(), "Route table replaced");
    }

    /// Append one route after those already registered.
    pub fn add_route(&mut self, route: Route) {
        let template = CompiledTemplate::compile(&route.path, self.config.repo_path_depth);
        let template_str = Arc::from(route.path.as_str());
        self.routes.push(RegisteredRoute {
            route,
            template,
            template_str,
        });
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(|r| &r.route)
    }

    /// Strip the context path, or `None` when the path lies outside it.
    pub fn strip_context_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        if self.context_path.is_empty() {
            return Some(path);
        }
        let rest = path.strip_prefix(self.context_path.as_str())?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Resolve a method and full request path to a route.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<ResolvedRequest<'_>> {
        self.resolve_entry(method, path)
            .map(|(entry, params, captures)| ResolvedRequest {
                route: &entry.route,
                params,
                captures,
            })
    }

    fn resolve_entry(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(&RegisteredRoute, Params, Vec<Capture>)> {
        let stripped = self.strip_context_path(path)?;
        let segments = split_path(stripped);

        let mut best: Option<(&RegisteredRoute, Params, Vec<Capture>)> = None;
        for entry in self.routes.iter().filter(|r| r.route.method == *method) {
            let Some((params, captures)) = entry.template.match_with_positions(&segments) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((current, _, _)) => {
                    entry.template.literal_prefix() > current.template.literal_prefix()
                }
            };
            if better {
                best = Some((entry, params, captures));
            }
        }
        best
    }

    /// Template-shaped label for a resolved request path.
    pub fn template_label(&self, path: &str, captures: &[Capture]) -> String {
        if captures.is_empty() {
            return path.to_string();
        }
        match self.strip_context_path(path) {
            Some(stripped) => format!(
                "{}{}",
                self.context_path,
                substitute_captures(stripped, captures)
            ),
            None => path.to_string(),
        }
    }

    /// Resolve, dispatch and instrument one request.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %method,
            path = %path
        );

        async move {
            let (mut response, labels) = match self.resolve_entry(&method, &path) {
                Some((entry, params, captures)) => {
                    let labels = self.config.metrics_enabled.then(|| RequestLabels {
                        method: method.to_string(),
                        classification: Some(entry.route.classification),
                        path: self.template_label(&path, &captures),
                    });
                    debug!(
                        template = %entry.template_str,
                        classification = %entry.route.classification,
                        params = ?params,
                        "Route matched"
                    );

                    let mut request = request;
                    request.extensions_mut().insert(params.clone());
                    request
                        .extensions_mut()
                        .insert(entry.route.classification);
                    let ctx = RouteContext {
                        request,
                        params,
                        classification: entry.route.classification,
                        template: Arc::clone(&entry.template_str),
                    };
                    (entry.route.handler.call(ctx).await, labels)
                }
                None => {
                    debug!("No route matched");
                    let labels = self.config.metrics_enabled.then(|| RequestLabels {
                        method: method.to_string(),
                        classification: None,
                        path: UNMATCHED_PATH_LABEL.to_string(),
                    });
                    (AppError::RouteNotFound.into_response(), labels)
                }
            };

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }

            let status = response.status();
            let elapsed = start.elapsed();
            info!(
                status = status.as_u16(),
                latency_ms = elapsed.as_secs_f64() * 1000.0,
                "Request served"
            );
            if let Some(labels) = labels {
                metrics::record_request(&labels, status, elapsed);
            }
            response
        }
        .instrument(span)
        .await
    }

    /// Freeze the table and mount it as the fallback of an axum router.
    pub fn into_service(self) -> axum::Router {
        let router = Arc::new(self);
        axum::Router::new().fallback(move |request: Request<Body>| {
            let router = Arc::clone(&router);
            async move { router.handle(request).await }
        })
    }
}
