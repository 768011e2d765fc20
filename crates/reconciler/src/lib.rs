// Domain-driven module structure for the image reconciler.

// Core infrastructure
pub mod docker;
pub mod client;

// Domain modules
pub mod desired;
pub mod reconcile;
pub mod conf;
pub mod runtime;
