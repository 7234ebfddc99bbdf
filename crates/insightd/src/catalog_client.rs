//! HTTP client for the control-plane catalogue.
//!
//! Both listers POST a JSON-encoded [`ListOptions`] and expect a
//! [`ListPage`] back. Any non-2xx status is reported as `Error::Catalog`
//! carrying the server's `message` when the body has one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use insight_core::catalog::{
    Application, ApplicationLister, Deployment, DeploymentLister, ListOptions, ListPage,
};
use insight_core::{Error, Result};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Catalogue client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCatalog {
    /// Creates a client targeting `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with a per-request timeout.
    #[must_use]
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{resource}/list", self.base_url.trim_end_matches('/'))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        resource: &str,
        options: &ListOptions,
    ) -> Result<ListPage<T>> {
        let response = self
            .client
            .post(self.url(resource))
            .json(options)
            .send()
            .await
            .map_err(|e| Error::catalog(format!("listing {resource} failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let url = self.url(resource);
            return response
                .json::<ListPage<T>>()
                .await
                .map_err(|e| Error::serialization(url, e));
        }

        let body = response.bytes().await.map_err(|e| {
            Error::catalog(format!("failed reading {resource} error body: {e}"))
        })?;
        let message = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| String::from_utf8_lossy(&body).to_string());

        match status {
            StatusCode::BAD_REQUEST => Err(Error::InvalidInput(message)),
            _ => Err(Error::catalog(format!(
                "listing {resource} failed ({status}): {message}"
            ))),
        }
    }
}

#[async_trait]
impl ApplicationLister for HttpCatalog {
    async fn list_applications(&self, options: &ListOptions) -> Result<ListPage<Application>> {
        self.list("applications", options).await
    }
}

#[async_trait]
impl DeploymentLister for HttpCatalog {
    async fn list_deployments(&self, options: &ListOptions) -> Result<ListPage<Deployment>> {
        self.list("deployments", options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use insight_core::catalog::{FilterOperator, FilterValue, ListFilter, fields};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    async fn spawn_status_server(status: StatusCode, body: serde_json::Value) -> String {
        spawn(Router::new().route(
            "/applications/list",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        ))
        .await
    }

    #[tokio::test]
    async fn posts_options_and_decodes_the_page() {
        let seen: Arc<Mutex<Vec<ListOptions>>> = Arc::default();
        let recorder = Arc::clone(&seen);
        let base = spawn(Router::new().route(
            "/deployments/list",
            post(move |Json(options): Json<ListOptions>| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push(options);
                    Json(json!({ "items": [], "cursor": "next" }))
                }
            }),
        ))
        .await;

        let client = HttpCatalog::new(format!("{base}/"));
        let options = ListOptions {
            filters: vec![ListFilter::new(
                fields::COMPLETED_AT,
                FilterOperator::Ge,
                FilterValue::Int(10),
            )],
            limit: 5,
            ..ListOptions::default()
        };
        let page = client.list_deployments(&options).await.unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.cursor, "next");
        assert_eq!(seen.lock().unwrap().as_slice(), &[options]);
    }

    #[tokio::test]
    async fn server_error_maps_to_catalog_error() {
        let base = spawn_status_server(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "message": "maintenance" }),
        )
        .await;
        let err = HttpCatalog::new(base)
            .list_applications(&ListOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Catalog { .. }), "got {err}");
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn bad_request_maps_to_invalid_input() {
        let base =
            spawn_status_server(StatusCode::BAD_REQUEST, json!({ "message": "bad filter" })).await;
        let err = HttpCatalog::new(base)
            .list_applications(&ListOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m == "bad filter"));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_catalog_error() {
        let err = HttpCatalog::with_timeout("http://127.0.0.1:9", Duration::from_millis(500))
            .list_applications(&ListOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Catalog { .. }));
    }
}
