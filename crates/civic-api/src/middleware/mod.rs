//! # Middleware
//!
//! Tower middleware shared by every authenticated route.

pub mod metrics;
