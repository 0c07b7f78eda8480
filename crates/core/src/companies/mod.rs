//! Companies module - read-only projection of the company master table.

mod companies_model;
mod companies_service;

pub use companies_model::Company;
pub use companies_service::CompanyService;
