use super::types::{ProductReference, ProductResponse};
use super::ProductCatalog;
use crate::errors::{AnalysisError, AnalysisResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Product service REST client. A 4xx answer is passed on as
/// `CatalogRejected`; every other failure (transport, timeout, 5xx, contract
/// violation) surfaces as `CatalogUnavailable` for the product id.
#[derive(Clone)]
pub struct HttpProductCatalog {
    client: Client,
    base_url: String,
}

impl HttpProductCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .pool_max_idle_per_host(8)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_product(&self, product_id: i64) -> AnalysisResult<ProductResponse> {
        let url = format!("{}/v1/product/{product_id}", self.base_url);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if status.is_client_error() {
            return Err(AnalysisError::CatalogRejected {
                product_id,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnalysisError::Network(format!("HTTP {status}: {body}")));
        }

        resp.json::<ProductResponse>()
            .await
            .map_err(|e| AnalysisError::Parse(format!("GET /v1/product/{product_id}: {e}")))
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    async fn fetch_product(&self, product_id: i64) -> AnalysisResult<ProductReference> {
        let product = self.get_product(product_id).await.map_err(|e| {
            tracing::warn!(product_id, error = %e, "product service call failed");
            match e {
                AnalysisError::CatalogRejected { .. } => e,
                other => AnalysisError::catalog(product_id, other.to_string()),
            }
        })?;
        product.into_reference(product_id)
    }
}
