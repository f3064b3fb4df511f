use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobState, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Payment pending",
            Self::Paid => "Payment received",
            Self::Processing => "Printing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }

    fn is_printing_or_later(&self) -> bool {
        matches!(self, Self::Processing | Self::Shipped | Self::Delivered)
    }

    fn is_shipped_or_later(&self) -> bool {
        matches!(self, Self::Shipped | Self::Delivered)
    }
}

// Unknown statuses render as pending.
impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "paid" => Self::Paid,
            "processing" => Self::Processing,
            "shipped" => Self::Shipped,
            "delivered" => Self::Delivered,
            "cancelled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.as_str().to_string()
    }
}

/// Server-owned order record, read through `GET /api/order/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderDetails {
    pub id: String,
    pub job_id: String,
    pub customer_email: String,
    pub size: String,
    pub material: String,
    #[serde(default)]
    pub color: Option<String>,
    pub price_cents: i64,
    pub status: OrderStatus,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::optional")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::optional")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStage {
    Placed,
    PaymentConfirmed,
    Printing,
    Shipped,
    Delivered,
}

impl OrderStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Placed => "Order placed",
            Self::PaymentConfirmed => "Payment confirmed",
            Self::Printing => "Printing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineStep {
    pub stage: OrderStage,
    pub completed: bool,
    pub at: Option<DateTime<Utc>>,
}

/// Where an order stands once the generation job is taken into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStage {
    AwaitingPayment,
    Modeling,
    ReadyToPrint,
    Printing,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FulfillmentProgress {
    pub stage: FulfillmentStage,
    pub percent: u8,
}

impl OrderDetails {
    pub fn timeline(&self) -> Vec<TimelineStep> {
        vec![
            TimelineStep {
                stage: OrderStage::Placed,
                completed: true,
                at: Some(self.created_at),
            },
            TimelineStep {
                stage: OrderStage::PaymentConfirmed,
                completed: self.paid_at.is_some(),
                at: self.paid_at,
            },
            TimelineStep {
                stage: OrderStage::Printing,
                completed: self.status.is_printing_or_later(),
                at: None,
            },
            TimelineStep {
                stage: OrderStage::Shipped,
                completed: self.status.is_shipped_or_later(),
                at: self.shipped_at,
            },
            TimelineStep {
                stage: OrderStage::Delivered,
                completed: self.status == OrderStatus::Delivered,
                at: None,
            },
        ]
    }

    /// Merge the order status with the job that produces its model.
    ///
    /// A paid order whose job has not finished its 3D conversion is still in
    /// `Modeling`; the job's own progress fills the 20..50 band.
    pub fn fulfillment(&self, job: Option<&JobStatus>) -> FulfillmentProgress {
        let (stage, percent) = match self.status {
            OrderStatus::Cancelled => (FulfillmentStage::Cancelled, 0),
            OrderStatus::Pending => (FulfillmentStage::AwaitingPayment, 10),
            OrderStatus::Paid => match job {
                Some(job) if job.state != JobState::Completed => {
                    let progress = if job.is_failed() { 0 } else { u32::from(job.progress.min(100)) };
                    (FulfillmentStage::Modeling, 20 + (progress * 30 / 100) as u8)
                }
                _ => (FulfillmentStage::ReadyToPrint, 50),
            },
            OrderStatus::Processing => (FulfillmentStage::Printing, 65),
            OrderStatus::Shipped => (FulfillmentStage::Shipped, 85),
            OrderStatus::Delivered => (FulfillmentStage::Delivered, 100),
        };

        FulfillmentProgress { stage, percent }
    }

    pub fn total_display(&self) -> String {
        crate::pricing::format_usd(self.price_cents)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // Naive timestamps from the backend are UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, de};

    pub fn required<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub fn optional<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.is_empty() => super::parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}"))),
            _ => Ok(None),
        }
    }
}
