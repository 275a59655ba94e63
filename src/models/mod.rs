pub mod fetch;
pub mod location;
pub mod observation;
pub mod summary;

pub use fetch::{FetchRecord, RecordKind};
pub use location::Location;
pub use observation::{Metric, ObservationRow};
pub use summary::{AlertRow, FeatureRow, MetricAggregate, Period, RiskLevel, SummaryRow, WeatherLabel};
