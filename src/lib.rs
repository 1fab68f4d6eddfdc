//! Shield admission gateway library.

pub mod admin;
pub mod config;
pub mod events;
pub mod http;
pub mod inspection;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;

pub use config::schema::GatewayConfig;
pub use lifecycle::{Gateway, Shutdown};
pub use pipeline::AdmissionPipeline;
