use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ps_core::{Catalog, ColorSupport, CostEstimate, JobState, JobStatus, MaterialOption, Price, SizeOption};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub style: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LegacyJobRequest {
    pub agent_name: String,
    pub description: String,
    pub style: String,
    pub size_mm: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobCreateResponse {
    pub job_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MaterialCostResponse {
    pub price_usd: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CostEstimateResponse {
    pub volume_cm3: f64,
    #[serde(default)]
    pub materials: BTreeMap<String, MaterialCostResponse>,
}

/// `GET /api/jobs/{id}` body as sent by either API version.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JobStatusResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub mesh_path: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub concept_only: bool,
    #[serde(default)]
    pub cost_estimate: Option<CostEstimateResponse>,
    #[serde(default)]
    pub completion_time: Option<f64>,
}

impl From<JobStatusResponse> for JobStatus {
    fn from(resp: JobStatusResponse) -> Self {
        let state = JobState::from_wire(&resp.status);
        let progress = match resp.progress {
            Some(p) if p.is_finite() => p.round().clamp(0.0, 100.0) as u8,
            _ => state.default_progress(),
        };

        JobStatus {
            id: resp.id,
            state,
            description: resp.description.unwrap_or_default(),
            image_path: resp.image_path.filter(|p| !p.is_empty()),
            mesh_path: resp.mesh_path.filter(|p| !p.is_empty()),
            progress,
            error_message: resp.error_message,
            concept_only: resp.concept_only,
            cost_estimate: resp.cost_estimate.map(|c| CostEstimate {
                volume_cm3: c.volume_cm3,
                material_prices_usd: c
                    .materials
                    .into_iter()
                    .map(|(k, v)| (k, v.price_usd))
                    .collect(),
            }),
            completion_time: resp.completion_time,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SizeResponse {
    #[serde(alias = "id")]
    pub key: String,
    #[serde(alias = "label")]
    pub name: String,
    pub height_mm: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MaterialResponse {
    #[serde(alias = "id")]
    pub key: String,
    #[serde(alias = "label")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub full_color: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MeshStyleResponse {
    #[serde(alias = "id")]
    pub key: String,
    #[serde(default, alias = "label")]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// `GET /api/options`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OptionsResponse {
    pub sizes: Vec<SizeResponse>,
    pub materials: Vec<MaterialResponse>,
    #[serde(default)]
    pub mesh_styles: Vec<MeshStyleResponse>,
    /// size -> material -> cents
    #[serde(default)]
    pub price_matrix: BTreeMap<String, BTreeMap<String, i64>>,
}

impl OptionsResponse {
    pub fn to_catalog(&self) -> Catalog {
        let sizes = self
            .sizes
            .iter()
            .map(|s| SizeOption {
                key: s.key.clone(),
                name: s.name.clone(),
                height_mm: s.height_mm,
                description: s.description.clone(),
            })
            .collect();

        let materials = self
            .materials
            .iter()
            .map(|m| MaterialOption {
                key: m.key.clone(),
                name: m.name.clone(),
                description: m.description.clone(),
                colors: if m.full_color {
                    ColorSupport::FullColor
                } else if m.colors.is_empty() {
                    ColorSupport::None
                } else {
                    ColorSupport::Discrete(m.colors.clone())
                },
            })
            .collect();

        Catalog::new(sizes, materials)
    }

    pub fn matrix_price(&self, size: &str, material: &str) -> Option<i64> {
        self.price_matrix.get(size)?.get(material).copied()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PresetPriceRequest {
    pub material: String,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

/// `POST /api/price`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PriceBreakdown {
    pub total_cents: i64,
    #[serde(default)]
    pub total_display: String,
    #[serde(default)]
    pub base_cents: Option<i64>,
    #[serde(default)]
    pub color_cents: Option<i64>,
    #[serde(default)]
    pub shipping_cents: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl PriceBreakdown {
    pub fn price(&self) -> Price {
        Price::new(self.total_cents, self.total_display.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RegionResponse {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LocalCurrency {
    #[serde(default)]
    pub code: Option<String>,
    pub display: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RegionalSizePrice {
    pub key: String,
    #[serde(default, alias = "name_es")]
    pub name: String,
    pub height_mm: u32,
    pub price_cents: i64,
    pub price_display: String,
    #[serde(default)]
    pub local_currency: Option<LocalCurrency>,
}

/// `GET /api/pricing/{country}`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RegionalPricing {
    #[serde(default)]
    pub country_code: Option<String>,
    pub region: RegionResponse,
    pub sizes: Vec<RegionalSizePrice>,
}

impl RegionalPricing {
    pub fn size(&self, key: &str) -> Option<&RegionalSizePrice> {
        self.sizes.iter().find(|s| s.key == key)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CustomPriceRequest {
    pub height_mm: u32,
    pub country_code: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HeightConstraints {
    pub min_mm: u32,
    pub max_mm: u32,
}

/// `POST /api/pricing/custom`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CustomPriceResponse {
    #[serde(alias = "price_cents")]
    pub total_cents: i64,
    #[serde(default, alias = "price_display")]
    pub total_display: String,
    #[serde(default)]
    pub height_mm: Option<u32>,
    #[serde(default)]
    pub constraints: Option<HeightConstraints>,
}

impl CustomPriceResponse {
    pub fn price(&self) -> Price {
        Price::new(self.total_cents, self.total_display.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ShippingAddress {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    #[default]
    Stripe,
    Paypal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckoutRequest {
    pub job_id: String,
    pub email: String,
    pub size: String,
    pub material: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub mesh_style: String,
    pub shipping_address: ShippingAddress,
    pub provider: PaymentProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_height_mm: Option<u32>,
}

/// `POST /api/checkout`
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct CheckoutResponse {
    #[serde(default)]
    pub checkout_url: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}
