//! Request-scoped tenant resolution.
//!
//! A tenant is resolved per request from the `X-Client-Id` header, then
//! the `client_id` query parameter, defaulting to the bootstrap tenant.
//! `?all_clients=true` lifts the scope for cross-tenant listings. The
//! value is an extractor, never a global.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::model::BOOTSTRAP_TENANT;

/// The tenant scope of one request.
#[derive(Debug, Clone)]
pub struct TenantScope {
    pub client_id: String,
    pub all_clients: bool,
}

impl TenantScope {
    /// Scope for store queries: `None` means unscoped (`all_clients`).
    pub fn filter(&self) -> Option<&str> {
        if self.all_clients {
            None
        } else {
            Some(&self.client_id)
        }
    }
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

impl<S> FromRequestParts<S> for TenantScope
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = parts.uri.query().unwrap_or("");
        let client_id = parts
            .headers
            .get("x-client-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| query_param(query, "client_id").map(str::to_string))
            .unwrap_or_else(|| BOOTSTRAP_TENANT.to_string());
        let all_clients = query_param(query, "all_clients") == Some("true");
        Ok(Self {
            client_id,
            all_clients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> TenantScope {
        let (mut parts, ()) = request.into_parts();
        TenantScope::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn header_wins_over_query() {
        let request = Request::builder()
            .uri("/api/screens?client_id=from-query")
            .header("X-Client-Id", "from-header")
            .body(())
            .unwrap();
        let scope = extract(request).await;
        assert_eq!(scope.client_id, "from-header");
        assert!(!scope.all_clients);
    }

    #[tokio::test]
    async fn query_fallback_then_default() {
        let request = Request::builder()
            .uri("/api/screens?client_id=acme")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.client_id, "acme");

        let request = Request::builder().uri("/api/screens").body(()).unwrap();
        let scope = extract(request).await;
        assert_eq!(scope.client_id, BOOTSTRAP_TENANT);
        assert_eq!(scope.filter(), Some(BOOTSTRAP_TENANT));
    }

    #[tokio::test]
    async fn all_clients_lifts_scope() {
        let request = Request::builder()
            .uri("/api/screens?all_clients=true")
            .body(())
            .unwrap();
        let scope = extract(request).await;
        assert!(scope.all_clients);
        assert_eq!(scope.filter(), None);
    }
}
