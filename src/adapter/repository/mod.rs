pub mod plan_postgres;
pub mod subscription_postgres;
pub mod traffic_stats_postgres;

pub use plan_postgres::PlanPostgresLookup;
pub use subscription_postgres::SubscriptionPostgresLookup;
pub use traffic_stats_postgres::TrafficStatsPostgresStore;
