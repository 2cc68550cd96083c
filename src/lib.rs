//! Operations console for a search-ad account: entity listing,
//! performance aggregation, bid-impact simulation and bulk bid/ON-OFF
//! control against the upstream advertising platform.

pub mod application;
pub mod auth;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod rate_limit;
