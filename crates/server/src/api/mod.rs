//! HTTP API handlers

pub mod clients;
pub mod health;
pub mod upload;

pub use clients::client_routes;
pub use health::health_routes;
