pub mod boundary_splitter;
pub mod business_calendar;
pub mod period_resolver;
pub mod quota_evaluator;
pub mod usage_aggregator;

pub use boundary_splitter::{split_period, SplitRanges};
pub use business_calendar::BusinessCalendar;
pub use period_resolver::{PeriodResolveError, PeriodResolver};
pub use quota_evaluator::evaluate_quota;
pub use usage_aggregator::aggregate_usage;
