use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown size: {0}")]
    UnknownSize(String),
    #[error("Unknown material: {0}")]
    UnknownMaterial(String),
    #[error("Unknown country: {0}")]
    UnknownCountry(String),
    #[error("Material {material} does not offer color {color}")]
    UnsupportedColor { material: String, color: String },
    #[error("Material {0} has no color choice")]
    NoColorChoice(String),
}
