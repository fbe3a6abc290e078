// Core security module - event classifiers and the automated responses they
// plan. Classifiers are pure; the service runs their plans through the
// action executor.

pub mod classifiers;
pub mod security_models;
pub mod security_service;

pub use classifiers::*;
pub use security_models::*;
pub use security_service::*;
