//! Upstream product identifiers

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Atlassian product a request is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    /// Jira (issues, projects, workflows)
    Jira,
    /// Confluence (spaces, pages)
    Confluence,
}

impl Product {
    /// All supported products, in registration order
    pub const ALL: [Product; 2] = [Product::Jira, Product::Confluence];

    /// Registry key (`"jira"` / `"confluence"`)
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Jira => "jira",
            Product::Confluence => "confluence",
        }
    }

    /// Human-readable name used as the error message prefix
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Product::Jira => "Jira",
            Product::Confluence => "Confluence",
        }
    }

    /// Environment variable prefix (`JIRA` / `CONFLUENCE`)
    #[must_use]
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Product::Jira => "JIRA",
            Product::Confluence => "CONFLUENCE",
        }
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jira" => Ok(Product::Jira),
            "confluence" => Ok(Product::Confluence),
            other => Err(format!("unknown product: {other}")),
        }
    }
}
