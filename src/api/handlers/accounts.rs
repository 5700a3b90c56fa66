//! Account endpoints relayed to the upstream API with the current token attached.
//!
//! Upstream answers are returned untouched: status, content type and raw body.

use super::internal_error;
use crate::credentials::{endpoint_url, UpstreamClient};
use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
};
use reqwest::Method;
use serde::Deserialize;
use url::Url;
use utoipa::IntoParams;

/// Optional time window, passed upstream as `interval.start_time` / `interval.end_time`.
#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct Interval {
    /// Window start, RFC 3339
    start_time: Option<String>,
    /// Window end, RFC 3339
    end_time: Option<String>,
}

impl Interval {
    fn query(&self) -> Vec<(&'static str, &str)> {
        let mut query = Vec::with_capacity(2);
        if let Some(start) = &self.start_time {
            query.push(("interval.start_time", start.as_str()));
        }
        if let Some(end) = &self.end_time {
            query.push(("interval.end_time", end.as_str()));
        }
        query
    }
}

#[utoipa::path(
    get,
    path = "/accounts/{account_id}",
    params(("account_id" = String, Path, description = "Trading account id")),
    responses(
        (status = 200, description = "Account as returned by the upstream"),
        (status = 401, description = "Missing or wrong API key, or upstream rejected the token"),
        (status = 500, description = "Upstream could not be reached"),
        (status = 503, description = "No upstream token and egress policy is fail-closed")
    ),
    security(("api_key" = [])),
    tag = "accounts"
)]
pub async fn account(
    Path(account_id): Path<String>,
    Extension(upstream): Extension<UpstreamClient>,
) -> Response {
    forward(&upstream, &account_id, None, &Interval::default()).await
}

#[utoipa::path(
    get,
    path = "/accounts/{account_id}/transactions",
    params(("account_id" = String, Path, description = "Trading account id"), Interval),
    responses(
        (status = 200, description = "Transactions as returned by the upstream"),
        (status = 401, description = "Missing or wrong API key, or upstream rejected the token"),
        (status = 500, description = "Upstream could not be reached"),
        (status = 503, description = "No upstream token and egress policy is fail-closed")
    ),
    security(("api_key" = [])),
    tag = "accounts"
)]
pub async fn transactions(
    Path(account_id): Path<String>,
    Query(interval): Query<Interval>,
    Extension(upstream): Extension<UpstreamClient>,
) -> Response {
    forward(&upstream, &account_id, Some("transactions"), &interval).await
}

#[utoipa::path(
    get,
    path = "/accounts/{account_id}/trades",
    params(("account_id" = String, Path, description = "Trading account id"), Interval),
    responses(
        (status = 200, description = "Trades as returned by the upstream"),
        (status = 401, description = "Missing or wrong API key, or upstream rejected the token"),
        (status = 500, description = "Upstream could not be reached"),
        (status = 503, description = "No upstream token and egress policy is fail-closed")
    ),
    security(("api_key" = [])),
    tag = "accounts"
)]
pub async fn trades(
    Path(account_id): Path<String>,
    Query(interval): Query<Interval>,
    Extension(upstream): Extension<UpstreamClient>,
) -> Response {
    forward(&upstream, &account_id, Some("trades"), &interval).await
}

async fn forward(
    upstream: &UpstreamClient,
    account_id: &str,
    resource: Option<&str>,
    interval: &Interval,
) -> Response {
    let url = match account_url(upstream.base_url(), account_id, resource) {
        Ok(url) => url,
        Err(e) => return internal_error(&e),
    };

    let request = upstream
        .request_url(Method::GET, url)
        .query(&interval.query());

    upstream.send_authorized(request).await.into_response()
}

/// `/v1/accounts/{account_id}[/{resource}]`, with the id percent-encoded as one segment.
fn account_url(base: &Url, account_id: &str, resource: Option<&str>) -> Result<Url, url::ParseError> {
    let mut url = endpoint_url(base, "/v1/accounts")?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
        segments.push(account_id);
        if let Some(resource) = resource {
            segments.push(resource);
        }
    }

    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn account_url_encodes_id() {
        let base = Url::parse("https://trade-api.finam.ru").unwrap();

        assert_eq!(
            account_url(&base, "A123", None).unwrap().as_str(),
            "https://trade-api.finam.ru/v1/accounts/A123"
        );
        assert_eq!(
            account_url(&base, "A123", Some("trades")).unwrap().as_str(),
            "https://trade-api.finam.ru/v1/accounts/A123/trades"
        );
        assert_eq!(
            account_url(&base, "../sessions", None).unwrap().path(),
            "/v1/accounts/..%2Fsessions"
        );
    }

    #[test]
    fn interval_query_skips_missing_bounds() {
        let interval = Interval {
            start_time: Some("2024-01-01T00:00:00Z".to_string()),
            end_time: None,
        };
        assert_eq!(
            interval.query(),
            vec![("interval.start_time", "2024-01-01T00:00:00Z")]
        );
        assert!(Interval::default().query().is_empty());
    }
}
