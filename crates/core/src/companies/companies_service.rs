use std::path::Path;

use log::debug;

use super::companies_model::Company;
use crate::dbf::{find_company_master, DbfTable};
use crate::errors::{Error, Result};

/// Reads the company master (`compmast.dbf`). The core never mutates it.
#[derive(Debug, Clone, Default)]
pub struct CompanyService;

impl CompanyService {
    pub fn new() -> Self {
        Self
    }

    /// Lists companies from the master found at (or below) `start`.
    pub fn list_companies(&self, start: &Path) -> Result<Vec<Company>> {
        let master = find_company_master(start).ok_or_else(|| {
            Error::NotFound(format!("compmast.dbf under {}", start.display()))
        })?;
        debug!("company master at {}", master.display());

        let table = DbfTable::open(&master)?;
        let name_idx = table
            .field_index("CCOMPNAME")
            .ok_or_else(|| Error::DbfSchema("compmast has no CCOMPNAME".to_string()))?;
        let path_idx = table
            .field_index("CDATAPATH")
            .ok_or_else(|| Error::DbfSchema("compmast has no CDATAPATH".to_string()))?;

        let mut companies = Vec::new();
        for record in table.iter_records()? {
            if record.deleted {
                continue;
            }
            let name = record.values[name_idx].to_string();
            let data_path = record.values[path_idx].to_string();
            if name.trim().is_empty() {
                continue;
            }
            companies.push(Company {
                name: name.trim().to_string(),
                data_path: data_path.trim().to_string(),
            });
        }
        Ok(companies)
    }

    /// Resolves a company name to its data directory, case-insensitively.
    pub fn resolve(&self, start: &Path, company_name: &str) -> Result<Company> {
        self.list_companies(start)?
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(company_name.trim()))
            .ok_or_else(|| Error::NotFound(format!("company '{}'", company_name)))
    }
}
