use tracing::info;

use crate::configurator::ResolvedConfiguration;
use crate::error::AppError;
use crate::generator::backend::StorefrontApi;
use crate::generator::backend::schemas::{CheckoutRequest, PaymentProvider, ShippingAddress};

pub const DEFAULT_MESH_STYLE: &str = "detailed";

/// What the shopper types on the checkout step.
#[derive(Debug, Clone, Default)]
pub struct CheckoutForm {
    pub job_id: String,
    pub email: String,
    pub shipping: ShippingAddress,
    pub provider: PaymentProvider,
    pub mesh_style: Option<String>,
}

/// Where to send the shopper to pay. The caller navigates; nothing here
/// follows the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRedirect {
    pub url: String,
    pub order_id: Option<String>,
    pub session_id: Option<String>,
    pub provider: PaymentProvider,
}

impl CheckoutForm {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.job_id.trim().is_empty() {
            return Err(AppError::Validation("no generated model to order".into()));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("a valid email is required".into()));
        }
        if self.shipping.name.trim().is_empty() {
            return Err(AppError::Validation("shipping name is required".into()));
        }
        if self.shipping.address.trim().is_empty() {
            return Err(AppError::Validation("shipping address is required".into()));
        }
        Ok(())
    }
}

pub fn build_request(
    form: &CheckoutForm,
    config: &ResolvedConfiguration,
) -> Result<CheckoutRequest, AppError> {
    form.validate()?;

    let mut shipping = form.shipping.clone();
    if shipping.country.trim().is_empty() {
        if let Some(country) = &config.country {
            shipping.country = country.clone();
        }
    }

    Ok(CheckoutRequest {
        job_id: form.job_id.trim().to_string(),
        email: form.email.trim().to_string(),
        size: config.size.clone(),
        material: config.material.clone(),
        color: config.color.clone(),
        mesh_style: form
            .mesh_style
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MESH_STYLE.to_string()),
        shipping_address: shipping,
        provider: form.provider,
        custom_height_mm: config.custom_height_mm,
    })
}

pub async fn submit_checkout(
    api: &dyn StorefrontApi,
    form: &CheckoutForm,
    config: &ResolvedConfiguration,
) -> Result<CheckoutRedirect, AppError> {
    let request = build_request(form, config)?;
    let response = api.create_checkout(&request).await?;

    let url = response
        .checkout_url
        .filter(|url| !url.trim().is_empty())
        .ok_or(AppError::MissingCheckoutUrl)?;

    info!(
        job_id = %request.job_id,
        order_id = response.order_id.as_deref().unwrap_or("-"),
        provider = ?form.provider,
        "Checkout session created"
    );

    Ok(CheckoutRedirect {
        url,
        order_id: response.order_id,
        session_id: response.session_id,
        provider: form.provider,
    })
}
