use crate::error::{CoreError, Result};

pub const CUSTOM_HEIGHT_MIN_MM: u32 = 30;
pub const CUSTOM_HEIGHT_MAX_MM: u32 = 300;

/// Clamp a requested custom height into the printable range.
pub fn clamp_custom_height(height_mm: u32) -> u32 {
    height_mm.clamp(CUSTOM_HEIGHT_MIN_MM, CUSTOM_HEIGHT_MAX_MM)
}

/// Built-in preset print heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetSize {
    Mini,
    Small,
    Medium,
    Large,
    Xl,
}

impl PresetSize {
    /// Key used in API requests
    pub fn id(&self) -> &'static str {
        match self {
            Self::Mini => "mini",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Xl => "xl",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mini => "Mini",
            Self::Small => "Small",
            Self::Medium => "Medium",
            Self::Large => "Large",
            Self::Xl => "XL",
        }
    }

    pub fn height_mm(&self) -> u32 {
        match self {
            Self::Mini => 50,
            Self::Small => 80,
            Self::Medium => 120,
            Self::Large => 180,
            Self::Xl => 250,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Mini => "Desk figure",
            Self::Small => "Shelf piece",
            Self::Medium => "Collectible size",
            Self::Large => "Display piece",
            Self::Xl => "Statement piece",
        }
    }

    pub fn all() -> [PresetSize; 5] {
        [Self::Mini, Self::Small, Self::Medium, Self::Large, Self::Xl]
    }
}

impl Default for PresetSize {
    fn default() -> Self {
        Self::Medium
    }
}

/// Built-in print materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    PlasticWhite,
    PlasticColor,
    ResinPremium,
    FullColor,
    MetalSteel,
}

impl MaterialKind {
    pub fn id(&self) -> &'static str {
        match self {
            Self::PlasticWhite => "plastic_white",
            Self::PlasticColor => "plastic_color",
            Self::ResinPremium => "resin_premium",
            Self::FullColor => "full_color",
            Self::MetalSteel => "metal_steel",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PlasticWhite => "White Plastic",
            Self::PlasticColor => "Color Plastic",
            Self::ResinPremium => "Premium Resin",
            Self::FullColor => "Full Color",
            Self::MetalSteel => "Stainless Steel",
        }
    }

    pub fn color_support(&self) -> ColorSupport {
        match self {
            Self::PlasticColor => ColorSupport::Discrete(
                ["red", "blue", "green", "yellow", "black", "orange"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
            Self::FullColor => ColorSupport::FullColor,
            Self::PlasticWhite | Self::ResinPremium | Self::MetalSteel => ColorSupport::None,
        }
    }

    pub fn all() -> [MaterialKind; 5] {
        [
            Self::PlasticWhite,
            Self::PlasticColor,
            Self::ResinPremium,
            Self::FullColor,
            Self::MetalSteel,
        ]
    }
}

impl Default for MaterialKind {
    fn default() -> Self {
        Self::PlasticWhite
    }
}

/// What kind of color choice a material offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSupport {
    /// Single fixed finish; no color is sent.
    None,
    /// Printed in full color; no discrete choice is sent.
    FullColor,
    /// Exactly one of these colors must be chosen.
    Discrete(Vec<String>),
}

impl ColorSupport {
    pub fn requires_choice(&self) -> bool {
        matches!(self, Self::Discrete(colors) if !colors.is_empty())
    }

    pub fn allows(&self, color: &str) -> bool {
        match self {
            Self::Discrete(colors) => colors.iter().any(|c| c == color),
            _ => false,
        }
    }

    /// Color to keep after switching to a material with this support.
    ///
    /// Returns `None` when the material takes no discrete color; otherwise the
    /// current color if it is offered, else the first offered color.
    pub fn reconcile(&self, current: Option<&str>) -> Option<String> {
        match self {
            Self::None | Self::FullColor => None,
            Self::Discrete(colors) => match current {
                Some(color) if colors.iter().any(|c| c == color) => Some(color.to_string()),
                _ => colors.first().cloned(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeOption {
    pub key: String,
    pub name: String,
    pub height_mm: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialOption {
    pub key: String,
    pub name: String,
    pub description: String,
    pub colors: ColorSupport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryOption {
    pub code: String,
    pub name: String,
}

const COUNTRIES: [(&str, &str); 19] = [
    ("MX", "Mexico"),
    ("US", "United States"),
    ("CA", "Canada"),
    ("CO", "Colombia"),
    ("AR", "Argentina"),
    ("CL", "Chile"),
    ("BR", "Brazil"),
    ("PE", "Peru"),
    ("EC", "Ecuador"),
    ("UY", "Uruguay"),
    ("PA", "Panama"),
    ("CR", "Costa Rica"),
    ("ES", "Spain"),
    ("DE", "Germany"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("IT", "Italy"),
    ("JP", "Japan"),
    ("AU", "Australia"),
];

pub const DEFAULT_COUNTRY: &str = "MX";

/// Everything a shopper can choose from.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub sizes: Vec<SizeOption>,
    pub materials: Vec<MaterialOption>,
    pub countries: Vec<CountryOption>,
}

impl Catalog {
    pub fn new(sizes: Vec<SizeOption>, materials: Vec<MaterialOption>) -> Self {
        Self {
            sizes,
            materials,
            countries: default_countries(),
        }
    }

    pub fn size(&self, key: &str) -> Result<&SizeOption> {
        self.sizes
            .iter()
            .find(|s| s.key == key)
            .ok_or_else(|| CoreError::UnknownSize(key.to_string()))
    }

    pub fn material(&self, key: &str) -> Result<&MaterialOption> {
        self.materials
            .iter()
            .find(|m| m.key == key)
            .ok_or_else(|| CoreError::UnknownMaterial(key.to_string()))
    }

    /// Country codes are matched case-insensitively and returned upper-cased.
    pub fn country(&self, code: &str) -> Result<&CountryOption> {
        self.countries
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .ok_or_else(|| CoreError::UnknownCountry(code.to_string()))
    }

    /// Check that `color` is a valid choice for `material`.
    pub fn validate_color(&self, material: &str, color: &str) -> Result<()> {
        let option = self.material(material)?;
        match &option.colors {
            ColorSupport::Discrete(_) if option.colors.allows(color) => Ok(()),
            ColorSupport::Discrete(_) => Err(CoreError::UnsupportedColor {
                material: material.to_string(),
                color: color.to_string(),
            }),
            _ => Err(CoreError::NoColorChoice(material.to_string())),
        }
    }

    pub fn default_size_key(&self) -> Option<&str> {
        let preferred = PresetSize::default().id();
        self.sizes
            .iter()
            .find(|s| s.key == preferred)
            .or_else(|| self.sizes.first())
            .map(|s| s.key.as_str())
    }

    pub fn default_material_key(&self) -> Option<&str> {
        let preferred = MaterialKind::default().id();
        self.materials
            .iter()
            .find(|m| m.key == preferred)
            .or_else(|| self.materials.first())
            .map(|m| m.key.as_str())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let sizes = PresetSize::all()
            .iter()
            .map(|s| SizeOption {
                key: s.id().to_string(),
                name: s.name().to_string(),
                height_mm: s.height_mm(),
                description: s.description().to_string(),
            })
            .collect();

        let materials = MaterialKind::all()
            .iter()
            .map(|m| MaterialOption {
                key: m.id().to_string(),
                name: m.name().to_string(),
                description: String::new(),
                colors: m.color_support(),
            })
            .collect();

        Self::new(sizes, materials)
    }
}

fn default_countries() -> Vec<CountryOption> {
    COUNTRIES
        .iter()
        .map(|(code, name)| CountryOption {
            code: code.to_string(),
            name: name.to_string(),
        })
        .collect()
}
