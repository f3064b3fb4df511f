//! Typed HTTP client for the storefront backend.
//!
//! Every endpoint goes through [`StorefrontApi`] so the poller and the
//! configuration resolver can run against an in-memory backend in tests.

pub mod config;
pub mod schemas;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use ps_core::{JobStatus, OrderDetails};
use crate::error::AppError;
use crate::generator::backend::config::BackendConfig;
use crate::generator::backend::schemas::{
    CheckoutRequest, CheckoutResponse, CustomPriceRequest, CustomPriceResponse, GenerateRequest,
    JobCreateResponse, JobStatusResponse, LegacyJobRequest, OptionsResponse, PresetPriceRequest,
    PriceBreakdown, RegionalPricing,
};

#[async_trait]
pub trait StorefrontApi: Send + Sync {
    async fn create_concept_job(&self, req: &GenerateRequest) -> Result<JobCreateResponse, AppError>;

    async fn create_legacy_job(&self, req: &LegacyJobRequest) -> Result<JobCreateResponse, AppError>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, AppError>;

    async fn options(&self) -> Result<OptionsResponse, AppError>;

    async fn preset_price(&self, req: &PresetPriceRequest) -> Result<PriceBreakdown, AppError>;

    async fn regional_pricing(&self, country_code: &str) -> Result<RegionalPricing, AppError>;

    async fn custom_price(&self, req: &CustomPriceRequest) -> Result<CustomPriceResponse, AppError>;

    async fn create_checkout(&self, req: &CheckoutRequest) -> Result<CheckoutResponse, AppError>;

    async fn order(&self, order_id: &str) -> Result<OrderDetails, AppError>;
}

pub struct GenBackend {
    client: reqwest::Client,
    api_url: String,
}

impl GenBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, AppError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Resolve a server-relative asset path (image, mesh) for download.
    pub fn asset_url(&self, path: &str) -> String {
        resolve_asset_url(&self.api_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, fallback: &str) -> Result<T, AppError> {
        debug!(path, "GET");
        let response = self
            .client
            .get(format!("{}{}", self.api_url, path))
            .send()
            .await?;

        Self::parse_response(response, fallback).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> Result<T, AppError> {
        debug!(path, "POST");
        let response = self
            .client
            .post(format!("{}{}", self.api_url, path))
            .json(body)
            .send()
            .await?;

        Self::parse_response(response, fallback).await
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
        fallback: &str,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = server_message(&body).unwrap_or_else(|| fallback.to_string());
            return Err(AppError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl StorefrontApi for GenBackend {
    async fn create_concept_job(&self, req: &GenerateRequest) -> Result<JobCreateResponse, AppError> {
        self.post("/api/generate", req, "Failed to start generation").await
    }

    async fn create_legacy_job(&self, req: &LegacyJobRequest) -> Result<JobCreateResponse, AppError> {
        self.post("/api/jobs", req, "Failed to start generation").await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, AppError> {
        let resp: JobStatusResponse = self
            .get(&format!("/api/jobs/{job_id}"), "Failed to get job status")
            .await?;
        Ok(resp.into())
    }

    async fn options(&self) -> Result<OptionsResponse, AppError> {
        self.get("/api/options", "Failed to load options").await
    }

    async fn preset_price(&self, req: &PresetPriceRequest) -> Result<PriceBreakdown, AppError> {
        self.post("/api/price", req, "Failed to calculate price").await
    }

    async fn regional_pricing(&self, country_code: &str) -> Result<RegionalPricing, AppError> {
        self.get(
            &format!("/api/pricing/{}", country_code.to_ascii_uppercase()),
            "Failed to load regional pricing",
        )
        .await
    }

    async fn custom_price(&self, req: &CustomPriceRequest) -> Result<CustomPriceResponse, AppError> {
        self.post("/api/pricing/custom", req, "Failed to calculate custom price").await
    }

    async fn create_checkout(&self, req: &CheckoutRequest) -> Result<CheckoutResponse, AppError> {
        self.post("/api/checkout", req, "Failed to create checkout").await
    }

    async fn order(&self, order_id: &str) -> Result<OrderDetails, AppError> {
        self.get(&format!("/api/order/{order_id}"), "Order not found").await
    }
}

/// Absolute URLs pass through; anything else is joined onto `base`.
pub fn resolve_asset_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message", "detail"]
        .iter()
        .find_map(|key| value.get(*key)?.as_str().map(str::to_string))
        .filter(|message| !message.trim().is_empty())
}
