pub mod config;
pub mod database;
pub mod in_memory;
pub mod redis_quota_cache;
pub mod redis_speed_layer;
pub mod startup;
pub mod task_queue;
pub mod telemetry;
