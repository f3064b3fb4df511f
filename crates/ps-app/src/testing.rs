//! In-memory backend for exercising the poller and the resolver.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use ps_core::{JobState, JobStatus, OrderDetails};
use crate::error::AppError;
use crate::generator::backend::StorefrontApi;
use crate::generator::backend::schemas::{
    CheckoutRequest, CheckoutResponse, CustomPriceRequest, CustomPriceResponse, GenerateRequest,
    JobCreateResponse, LegacyJobRequest, MaterialResponse, OptionsResponse, PresetPriceRequest,
    PriceBreakdown, RegionResponse, RegionalPricing, SizeResponse,
};

pub fn job(id: &str, state: JobState, progress: u8) -> JobStatus {
    JobStatus {
        id: id.to_string(),
        state,
        description: "a steampunk owl".to_string(),
        image_path: None,
        mesh_path: None,
        progress,
        error_message: None,
        concept_only: false,
        cost_estimate: None,
        completion_time: None,
    }
}

/// Preset price: size base + 500 for colored plastic + 1000 outside MX.
pub fn preset_cents(req: &PresetPriceRequest) -> i64 {
    let base = match req.size.as_str() {
        "mini" => 2900,
        "small" => 3900,
        "medium" => 5200,
        "large" => 6900,
        "xl" => 8900,
        _ => 9900,
    };
    let color = if req.color.is_some() { 500 } else { 0 };
    let shipping = match req.country_code.as_deref() {
        None | Some("MX") => 0,
        Some(_) => 1000,
    };
    base + color + shipping
}

pub fn custom_cents(req: &CustomPriceRequest) -> i64 {
    i64::from(req.height_mm) * 40
}

pub struct FakeBackend {
    created: Instant,
    statuses: Mutex<VecDeque<Result<JobStatus, AppError>>>,
    status_calls: Mutex<Vec<Duration>>,
    status_delay: Mutex<Duration>,
    preset_requests: Mutex<Vec<PresetPriceRequest>>,
    custom_requests: Mutex<Vec<CustomPriceRequest>>,
    price_delays: Mutex<HashMap<String, Duration>>,
    fail_prices: AtomicBool,
    checkout_requests: Mutex<Vec<CheckoutRequest>>,
    checkout_response: Mutex<Option<CheckoutResponse>>,
    generate_requests: Mutex<Vec<GenerateRequest>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            created: Instant::now(),
            statuses: Mutex::new(VecDeque::new()),
            status_calls: Mutex::new(Vec::new()),
            status_delay: Mutex::new(Duration::ZERO),
            preset_requests: Mutex::new(Vec::new()),
            custom_requests: Mutex::new(Vec::new()),
            price_delays: Mutex::new(HashMap::new()),
            fail_prices: AtomicBool::new(false),
            checkout_requests: Mutex::new(Vec::new()),
            checkout_response: Mutex::new(None),
            generate_requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub fn script_statuses(&self, script: Vec<Result<JobStatus, AppError>>) {
        self.statuses.lock().unwrap().extend(script);
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = delay;
    }

    /// Time of each status request, relative to when the fake was built.
    pub fn status_call_offsets(&self) -> Vec<Duration> {
        self.status_calls.lock().unwrap().clone()
    }

    /// Delay price responses whose size key (preset) or "custom" matches.
    pub fn delay_price(&self, key: &str, delay: Duration) {
        self.price_delays.lock().unwrap().insert(key.to_string(), delay);
    }

    pub fn fail_prices(&self, fail: bool) {
        self.fail_prices.store(fail, Ordering::SeqCst);
    }

    pub fn preset_requests(&self) -> Vec<PresetPriceRequest> {
        self.preset_requests.lock().unwrap().clone()
    }

    pub fn custom_requests(&self) -> Vec<CustomPriceRequest> {
        self.custom_requests.lock().unwrap().clone()
    }

    pub fn set_checkout_response(&self, response: CheckoutResponse) {
        *self.checkout_response.lock().unwrap() = Some(response);
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutRequest> {
        self.checkout_requests.lock().unwrap().clone()
    }

    pub fn generate_requests(&self) -> Vec<GenerateRequest> {
        self.generate_requests.lock().unwrap().clone()
    }

    fn price_delay(&self, key: &str) -> Duration {
        self.price_delays
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    fn price_failure(&self) -> Result<(), AppError> {
        if self.fail_prices.load(Ordering::SeqCst) {
            return Err(AppError::Backend {
                status: 503,
                message: "Pricing service unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorefrontApi for FakeBackend {
    async fn create_concept_job(&self, req: &GenerateRequest) -> Result<JobCreateResponse, AppError> {
        self.generate_requests.lock().unwrap().push(req.clone());
        Ok(JobCreateResponse {
            job_id: "job_1".into(),
            status: Some("pending".into()),
            status_url: Some("/api/jobs/job_1".into()),
            message: None,
        })
    }

    async fn create_legacy_job(&self, req: &LegacyJobRequest) -> Result<JobCreateResponse, AppError> {
        self.generate_requests.lock().unwrap().push(GenerateRequest {
            prompt: req.description.clone(),
            style: req.style.clone(),
        });
        Ok(JobCreateResponse {
            job_id: "job_legacy".into(),
            status: Some("pending".into()),
            status_url: None,
            message: None,
        })
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, AppError> {
        self.status_calls.lock().unwrap().push(self.created.elapsed());

        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(AppError::Backend {
                    status: 404,
                    message: format!("No scripted status for {job_id}"),
                })
            })
    }

    async fn options(&self) -> Result<OptionsResponse, AppError> {
        Ok(OptionsResponse {
            sizes: vec![SizeResponse {
                key: "medium".into(),
                name: "Medium".into(),
                height_mm: 120,
                description: String::new(),
            }],
            materials: vec![MaterialResponse {
                key: "plastic_white".into(),
                name: "White Plastic".into(),
                description: String::new(),
                colors: Vec::new(),
                full_color: false,
            }],
            mesh_styles: Vec::new(),
            price_matrix: Default::default(),
        })
    }

    async fn preset_price(&self, req: &PresetPriceRequest) -> Result<PriceBreakdown, AppError> {
        self.preset_requests.lock().unwrap().push(req.clone());

        let delay = self.price_delay(&req.size);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.price_failure()?;

        Ok(PriceBreakdown {
            total_cents: preset_cents(req),
            total_display: String::new(),
            base_cents: None,
            color_cents: None,
            shipping_cents: None,
            currency: Some("USD".into()),
        })
    }

    async fn regional_pricing(&self, country_code: &str) -> Result<RegionalPricing, AppError> {
        let latam = !matches!(country_code, "US" | "CA");
        Ok(RegionalPricing {
            country_code: None,
            region: RegionResponse {
                key: if latam { "latam".into() } else { "usa_canada".into() },
                name: String::new(),
                currency: None,
            },
            sizes: Vec::new(),
        })
    }

    async fn custom_price(&self, req: &CustomPriceRequest) -> Result<CustomPriceResponse, AppError> {
        self.custom_requests.lock().unwrap().push(req.clone());

        let delay = self.price_delay("custom");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.price_failure()?;

        Ok(CustomPriceResponse {
            total_cents: custom_cents(req),
            total_display: String::new(),
            height_mm: Some(req.height_mm),
            constraints: None,
        })
    }

    async fn create_checkout(&self, req: &CheckoutRequest) -> Result<CheckoutResponse, AppError> {
        self.checkout_requests.lock().unwrap().push(req.clone());
        Ok(self
            .checkout_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_default())
    }

    async fn order(&self, order_id: &str) -> Result<OrderDetails, AppError> {
        Err(AppError::Backend {
            status: 404,
            message: format!("Order {order_id} not found"),
        })
    }
}
