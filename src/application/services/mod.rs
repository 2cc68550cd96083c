pub mod console_service;
pub mod stats_cache;
