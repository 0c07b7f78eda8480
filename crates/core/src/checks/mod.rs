//! Checks module - the checks register projection and write-back.

mod checks_model;
mod checks_service;

pub use checks_model::{CheckId, CheckRecord};
pub use checks_service::ChecksService;
