//! Size / material / color / country selection and its price.
//!
//! Every setter invalidates the current price and issues a new lookup tagged
//! with a fresh token. A response is applied only if its token is still the
//! latest one, so a slow answer for an old selection can never overwrite the
//! price of a newer one. Custom-height edits wait for a quiet period before
//! the lookup is sent; discrete selections are looked up immediately.
//!
//! Setters spawn onto the current tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use ps_core::catalog::{DEFAULT_COUNTRY, clamp_custom_height};
use ps_core::{Catalog, Price};
use crate::error::AppError;
use crate::generator::backend::StorefrontApi;
use crate::generator::backend::schemas::{CustomPriceRequest, PresetPriceRequest, RegionalPricing};

pub const DEFAULT_PRICE_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceMode {
    Preset,
    CustomHeight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub size: String,
    pub material: String,
    pub color: Option<String>,
    pub country: Option<String>,
    pub custom_height_enabled: bool,
    pub custom_height_mm: u32,
}

impl Selection {
    pub fn mode(&self) -> PriceMode {
        if self.custom_height_enabled {
            PriceMode::CustomHeight
        } else {
            PriceMode::Preset
        }
    }

    fn query(&self) -> PriceQuery {
        match self.mode() {
            PriceMode::Preset => PriceQuery::Preset(PresetPriceRequest {
                material: self.material.clone(),
                size: self.size.clone(),
                color: self.color.clone(),
                country_code: self.country.clone(),
            }),
            PriceMode::CustomHeight => PriceQuery::Custom(CustomPriceRequest {
                height_mm: clamp_custom_height(self.custom_height_mm),
                country_code: self
                    .country
                    .clone()
                    .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone)]
enum PriceQuery {
    Preset(PresetPriceRequest),
    Custom(CustomPriceRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pricing {
    Loading { stale: Option<Price> },
    Resolved { price: Price, mode: PriceMode },
    Failed { error: String, stale: Option<Price> },
}

impl Pricing {
    fn last_price(&self) -> Option<&Price> {
        match self {
            Self::Loading { stale } | Self::Failed { stale, .. } => stale.as_ref(),
            Self::Resolved { price, .. } => Some(price),
        }
    }

    fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

/// Snapshot published to subscribers on every change.
#[derive(Debug, Clone)]
pub struct ResolverState {
    selection: Selection,
    pricing: Pricing,
    token: u64,
    /// Loaded region, keyed by the country it was requested for.
    region: Option<(String, RegionalPricing)>,
}

impl ResolverState {
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn is_loading(&self) -> bool {
        self.pricing.is_loading()
    }

    /// Last known price, which may belong to an earlier selection.
    pub fn last_price(&self) -> Option<&Price> {
        self.pricing.last_price()
    }

    /// Price of exactly this selection, once it has resolved.
    pub fn resolved_price(&self) -> Option<&Price> {
        match &self.pricing {
            Pricing::Resolved { price, .. } => Some(price),
            _ => None,
        }
    }
}

/// A selection whose price matches it exactly. This is what checkout reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfiguration {
    pub size: String,
    pub material: String,
    pub color: Option<String>,
    pub country: Option<String>,
    pub custom_height_mm: Option<u32>,
    pub price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedConfiguration),
    /// A lookup is in flight. `stale` is the previous price of the same mode,
    /// for context only; it does not describe the current selection.
    Loading { stale: Option<Price> },
    /// The last lookup failed. Re-setting any dimension retries.
    Failed { error: String, stale: Option<Price> },
    Invalid(String),
}

impl Resolution {
    pub fn price(&self) -> Option<&Price> {
        match self {
            Self::Resolved(config) => Some(&config.price),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

pub struct ConfigurationResolver {
    api: Arc<dyn StorefrontApi>,
    catalog: Catalog,
    debounce: Duration,
    state: Arc<watch::Sender<ResolverState>>,
}

impl ConfigurationResolver {
    /// Start from the catalog defaults and look up their price.
    pub fn new(api: Arc<dyn StorefrontApi>, catalog: Catalog) -> Self {
        Self::with_debounce(api, catalog, DEFAULT_PRICE_DEBOUNCE)
    }

    pub fn with_debounce(api: Arc<dyn StorefrontApi>, catalog: Catalog, debounce: Duration) -> Self {
        let size = catalog.default_size_key().unwrap_or_default().to_string();
        let material = catalog.default_material_key().unwrap_or_default().to_string();
        let color = catalog
            .material(&material)
            .ok()
            .and_then(|m| m.colors.reconcile(None));
        let custom_height_mm = catalog.size(&size).map(|s| s.height_mm).unwrap_or(100);

        let selection = Selection {
            size,
            material,
            color,
            country: None,
            custom_height_enabled: false,
            custom_height_mm: clamp_custom_height(custom_height_mm),
        };

        let (state, _) = watch::channel(ResolverState {
            selection,
            pricing: Pricing::Loading { stale: None },
            token: 0,
            region: None,
        });

        let resolver = Self {
            api,
            catalog,
            debounce,
            state: Arc::new(state),
        };
        resolver.change(false, |_| {});
        resolver
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn selection(&self) -> Selection {
        self.state.borrow().selection.clone()
    }

    pub fn set_size(&self, size: &str) -> Result<(), AppError> {
        self.catalog.size(size)?;
        self.change(false, |s| {
            s.size = size.to_string();
            s.custom_height_enabled = false;
        });
        Ok(())
    }

    /// Change material and bring the color back in line with it.
    pub fn set_material(&self, material: &str) -> Result<(), AppError> {
        let colors = self.catalog.material(material)?.colors.clone();
        self.change(false, |s| {
            s.material = material.to_string();
            s.color = colors.reconcile(s.color.as_deref());
        });
        Ok(())
    }

    pub fn set_color(&self, color: &str) -> Result<(), AppError> {
        let material = self.state.borrow().selection.material.clone();
        self.catalog.validate_color(&material, color)?;
        self.change(false, |s| s.color = Some(color.to_string()));
        Ok(())
    }

    pub fn set_country(&self, country: &str) -> Result<(), AppError> {
        let code = self.catalog.country(country)?.code.clone();
        self.change(false, |s| s.country = Some(code));
        Ok(())
    }

    /// Switch between the preset-size and custom-height price paths.
    pub fn set_custom_height_enabled(&self, enabled: bool) {
        self.change(false, |s| s.custom_height_enabled = enabled);
    }

    /// Set the custom height, clamped into the printable range. Also turns the
    /// custom path on. The lookup waits for the debounce period.
    pub fn set_custom_height(&self, height_mm: u32) {
        let clamped = clamp_custom_height(height_mm);
        if clamped != height_mm {
            debug!(requested = height_mm, clamped, "Custom height clamped");
        }
        self.change(true, |s| {
            s.custom_height_enabled = true;
            s.custom_height_mm = clamped;
        });
    }

    /// Replace the catalog (e.g. with the backend's options) and repair the
    /// selection against it.
    pub fn set_catalog(&mut self, catalog: Catalog) {
        self.catalog = catalog;
        let catalog = &self.catalog;
        self.change(false, |s| {
            if catalog.size(&s.size).is_err() {
                if let Some(key) = catalog.default_size_key() {
                    s.size = key.to_string();
                }
            }
            if catalog.material(&s.material).is_err() {
                if let Some(key) = catalog.default_material_key() {
                    s.material = key.to_string();
                }
            }
            s.color = catalog
                .material(&s.material)
                .ok()
                .and_then(|m| m.colors.reconcile(s.color.as_deref()));
        });
    }

    pub fn resolution(&self) -> Resolution {
        let state = self.state.borrow();
        if let Err(reason) = self.validate(&state.selection) {
            return Resolution::Invalid(reason);
        }

        match &state.pricing {
            Pricing::Loading { stale } => Resolution::Loading { stale: stale.clone() },
            Pricing::Failed { error, stale } => Resolution::Failed {
                error: error.clone(),
                stale: stale.clone(),
            },
            Pricing::Resolved { price, mode } => {
                let s = &state.selection;
                Resolution::Resolved(ResolvedConfiguration {
                    size: s.size.clone(),
                    material: s.material.clone(),
                    color: s.color.clone(),
                    country: s.country.clone(),
                    custom_height_mm: (*mode == PriceMode::CustomHeight)
                        .then(|| clamp_custom_height(s.custom_height_mm)),
                    price: price.clone(),
                })
            }
        }
    }

    /// Wait until no lookup is in flight and return the outcome.
    pub async fn settled(&self) -> Resolution {
        let mut rx = self.state.subscribe();
        loop {
            if !rx.borrow_and_update().pricing.is_loading() {
                return self.resolution();
            }
            if rx.changed().await.is_err() {
                return self.resolution();
            }
        }
    }

    /// Receiver that wakes on every selection or price change.
    pub fn subscribe(&self) -> watch::Receiver<ResolverState> {
        self.state.subscribe()
    }

    /// The configuration checkout may use, or why it cannot proceed yet.
    pub fn checkout_selection(&self) -> Result<ResolvedConfiguration, AppError> {
        match self.resolution() {
            Resolution::Resolved(config) => Ok(config),
            Resolution::Loading { .. } => Err(AppError::Validation("price is still loading".into())),
            Resolution::Failed { error, .. } => {
                Err(AppError::Validation(format!("price unavailable: {error}")))
            }
            Resolution::Invalid(reason) => Err(AppError::Validation(reason)),
        }
    }

    /// Fetch the pricing region for the selected (or default) country.
    pub async fn load_region(&self) -> Result<RegionalPricing, AppError> {
        let country = self
            .state
            .borrow()
            .selection
            .country
            .clone()
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string());

        let pricing = self.api.regional_pricing(&country).await?;
        self.state.send_modify(|s| {
            if s.selection.country.as_deref().unwrap_or(DEFAULT_COUNTRY) == country {
                s.region = Some((country.clone(), pricing.clone()));
            }
        });
        Ok(pricing)
    }

    pub fn region(&self) -> Option<RegionalPricing> {
        self.state.borrow().region.as_ref().map(|(_, pricing)| pricing.clone())
    }

    fn validate(&self, selection: &Selection) -> Result<(), String> {
        self.catalog.size(&selection.size).map_err(|e| e.to_string())?;
        let material = self.catalog.material(&selection.material).map_err(|e| e.to_string())?;
        match &selection.color {
            Some(color) => self
                .catalog
                .validate_color(&material.key, color)
                .map_err(|e| e.to_string()),
            None if material.colors.requires_choice() => {
                Err(format!("Material {} needs a color", material.key))
            }
            None => Ok(()),
        }
    }

    /// Apply `f` to the selection, invalidate the price and issue a lookup.
    ///
    /// The edit, the new token and the `Loading` state are published as one
    /// update, so no observer sees the new selection with the old price.
    fn change(&self, debounce: bool, f: impl FnOnce(&mut Selection)) {
        let mut issued = 0;
        let mut query = None;
        let mut mode = PriceMode::Preset;

        self.state.send_modify(|s| {
            let before = s.selection.mode();
            f(&mut s.selection);
            let mode_changed = s.selection.mode() != before;

            s.token += 1;
            issued = s.token;
            mode = s.selection.mode();
            query = Some(s.selection.query());

            // The other mode's price must not linger as context.
            let stale = if mode_changed {
                None
            } else {
                s.pricing.last_price().cloned()
            };
            s.pricing = Pricing::Loading { stale };

            let selected = s.selection.country.as_deref().unwrap_or(DEFAULT_COUNTRY);
            if s.region.as_ref().is_some_and(|(loaded, _)| !loaded.eq_ignore_ascii_case(selected)) {
                debug!(country = selected, "Dropping region loaded for another country");
                s.region = None;
            }
        });

        let Some(query) = query else { return };
        let delay = if debounce { self.debounce } else { Duration::ZERO };
        let api = self.api.clone();
        let state = self.state.clone();

        debug!(token = issued, ?mode, debounce_ms = delay.as_millis() as u64, "Price lookup scheduled");

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
                if state.borrow().token != issued {
                    debug!(token = issued, "Price lookup superseded before sending");
                    return;
                }
            }

            let result = match &query {
                PriceQuery::Preset(req) => api.preset_price(req).await.map(|b| b.price()),
                PriceQuery::Custom(req) => api.custom_price(req).await.map(|r| r.price()),
            };

            state.send_if_modified(|s| {
                if s.token != issued {
                    debug!(token = issued, latest = s.token, "Discarding stale price response");
                    return false;
                }

                s.pricing = match result {
                    Ok(price) => {
                        debug!(token = issued, cents = price.cents, "Price resolved");
                        Pricing::Resolved { price, mode }
                    }
                    Err(e) => {
                        warn!(token = issued, error = %e, "Price lookup failed");
                        Pricing::Failed {
                            error: e.to_string(),
                            stale: s.pricing.last_price().cloned(),
                        }
                    }
                };
                true
            });
        });
    }
}
