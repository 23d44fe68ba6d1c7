//! Tower middleware enforcing access decisions on axum routes
//!
//! ```ignore
//! let resolver = Arc::new(AccessResolver::from_config(&config)?);
//! let app = Router::new()
//!     .route("/user/{user}", get(profile))
//!     .layer(AuthorizationLayer::new(resolver));
//! ```
//!
//! Authentication is not handled here: an earlier layer is expected to insert
//! the principal's [`GrantedAuthorities`] into the request extensions.
//! Requests without them are evaluated as anonymous.
//!
//! Paths carrying an encoded `/` or `\` (`%2F`, `%5C`) are refused before
//! any rule is consulted.

use crate::access_control::{AccessResolver, GrantedAuthorities, RequestDescriptor};
use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::warn;

/// Function type for pulling the principal's authorities out of a request
type AuthorityExtractor = Arc<dyn Fn(&Request) -> GrantedAuthorities + Send + Sync>;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Where the request scheme comes from
///
/// Servers usually see origin-form URIs (`/path`) with no scheme, so rules
/// with a `scheme` constraint need one of the non-default sources to match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemeSource {
    /// Scheme of the request URI, present only for absolute-form URIs
    #[default]
    Uri,
    /// Every request is treated as arriving over this scheme
    Fixed(String),
    /// First value of `X-Forwarded-Proto`, falling back to the URI.
    /// Only enable behind a proxy that overwrites the header.
    ForwardedProto,
}

impl SchemeSource {
    fn resolve(&self, request: &Request) -> Option<String> {
        match self {
            SchemeSource::Uri => request.uri().scheme_str().map(str::to_string),
            SchemeSource::Fixed(scheme) => Some(scheme.clone()),
            SchemeSource::ForwardedProto => request
                .headers()
                .get(FORWARDED_PROTO)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .or_else(|| request.uri().scheme_str().map(str::to_string)),
        }
    }
}

/// Authorization layer for axum routes
#[derive(Clone)]
pub struct AuthorizationLayer {
    resolver: Arc<AccessResolver>,
    extractor: AuthorityExtractor,
    scheme_source: SchemeSource,
}

impl AuthorizationLayer {
    /// Read authorities from the `GrantedAuthorities` request extension
    pub fn new(resolver: Arc<AccessResolver>) -> Self {
        Self {
            resolver,
            extractor: Arc::new(extension_authorities),
            scheme_source: SchemeSource::default(),
        }
    }

    /// Create with a custom authority extractor
    pub fn with_extractor<F>(resolver: Arc<AccessResolver>, extractor: F) -> Self
    where
        F: Fn(&Request) -> GrantedAuthorities + Send + Sync + 'static,
    {
        Self {
            resolver,
            extractor: Arc::new(extractor),
            scheme_source: SchemeSource::default(),
        }
    }

    /// Treat every request as arriving over `scheme`, e.g. behind TLS termination
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme_source = SchemeSource::Fixed(scheme.into());
        self
    }

    /// Take the scheme from `X-Forwarded-Proto`
    pub fn trust_forwarded_proto(mut self) -> Self {
        self.scheme_source = SchemeSource::ForwardedProto;
        self
    }

    pub fn scheme_source(&self) -> &SchemeSource {
        &self.scheme_source
    }
}

fn extension_authorities(request: &Request) -> GrantedAuthorities {
    request
        .extensions()
        .get::<GrantedAuthorities>()
        .cloned()
        .unwrap_or_default()
}

/// True when the raw path hides a segment separator behind percent-encoding
pub fn has_encoded_separator(raw_path: &str) -> bool {
    let lower = raw_path.to_ascii_lowercase();
    lower.contains("%2f") || lower.contains("%5c")
}

/// Build the engine's view of an HTTP request
pub fn describe_request(request: &Request, scheme_source: &SchemeSource) -> RequestDescriptor {
    let raw_path = request.uri().path();
    let path = urlencoding::decode(raw_path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| raw_path.to_string());

    let mut descriptor = RequestDescriptor::new(request.method().as_str(), path);

    if let Some(scheme) = scheme_source.resolve(request) {
        descriptor = descriptor.with_scheme(scheme);
    }

    let host = request.uri().host().or_else(|| {
        request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
    });
    if let Some(host) = host {
        descriptor = descriptor.with_host(host);
    }

    descriptor
}

fn forbidden_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({
            "error": "Access denied",
            "code": 403
        })),
    )
        .into_response()
}

impl<S> tower::Layer<S> for AuthorizationLayer {
    type Service = AuthorizationMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationMiddleware {
            inner,
            resolver: self.resolver.clone(),
            extractor: self.extractor.clone(),
            scheme_source: self.scheme_source.clone(),
        }
    }
}

/// Authorization middleware service
#[derive(Clone)]
pub struct AuthorizationMiddleware<S> {
    inner: S,
    resolver: Arc<AccessResolver>,
    extractor: AuthorityExtractor,
    scheme_source: SchemeSource,
}

impl<S> tower::Service<Request> for AuthorizationMiddleware<S>
where
    S: tower::Service<Request, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        if has_encoded_separator(request.uri().path()) {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "Request denied: encoded path separator"
            );
            return Box::pin(async { Ok(forbidden_response()) });
        }

        let descriptor = describe_request(&request, &self.scheme_source);
        let authorities = (self.extractor)(&request);
        let outcome = self.resolver.evaluate(&descriptor, &authorities);

        if outcome.decision.is_denied() {
            warn!(
                method = %descriptor.method,
                path = %descriptor.path,
                rule = ?outcome.rule,
                "Request denied"
            );
            return Box::pin(async { Ok(forbidden_response()) });
        }

        // The clone may not be ready; keep the service that was polled
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(request).await })
    }
}
