use serde::Serialize;

/// A resolved price in integer cents with the text the backend wants shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Price {
    pub cents: i64,
    pub display: String,
}

impl Price {
    pub fn new(cents: i64, display: impl Into<String>) -> Self {
        let display = display.into();
        if display.trim().is_empty() {
            return Self::from_cents(cents);
        }
        Self { cents, display }
    }

    /// Price with a locally formatted USD display string.
    pub fn from_cents(cents: i64) -> Self {
        Self {
            cents,
            display: format_usd(cents),
        }
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display)
    }
}

pub fn format_usd(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02} USD", abs / 100, abs % 100)
}
