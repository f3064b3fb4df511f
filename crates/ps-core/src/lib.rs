pub mod catalog;
pub mod error;
pub mod job;
pub mod order;
pub mod pricing;

pub use catalog::{Catalog, ColorSupport, CountryOption, MaterialKind, MaterialOption, PresetSize, SizeOption};
pub use error::{CoreError, Result};
pub use job::{JobState, JobStatus, CostEstimate};
pub use order::{FulfillmentProgress, FulfillmentStage, OrderDetails, OrderStage, OrderStatus, TimelineStep};
pub use pricing::Price;
