//! Card payment lifecycle service: creation, capture, cancellation, and
//! refunds against an external gateway, reconciled through signed webhooks.

pub mod api;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
