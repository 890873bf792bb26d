//! HTTP client for the registration portal's section listing.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::section::{parse_section_bytes, Section, SectionParseError};

/// Section listing endpoint of the portal.
pub const ATLAS_SECTION_URL: &str =
    "https://atlas.montana.edu:9000/pls/bzagent/bzskcrse.PW_ListSchClassSimple";

/// Configuration for the portal client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// URL the search form is posted to
    #[serde(default = "default_section_url")]
    pub section_url: String,
    /// Total request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_section_url() -> String {
    ATLAS_SECTION_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            section_url: default_section_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Errors that can occur while fetching a section listing.
#[derive(Debug, Error, Clone)]
pub enum AtlasError {
    /// Network/HTTP request failed
    #[error("Network error: {message}")]
    Network { message: String },

    /// The portal answered with a non-success status
    #[error("Section listing returned status {status}")]
    Status { status: u16 },

    /// The listing could not be parsed
    #[error(transparent)]
    Parse(#[from] SectionParseError),
}

impl AtlasError {
    /// Returns true if this error is potentially transient and retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            AtlasError::Network { .. } => true,
            AtlasError::Status { status } => *status >= 500,
            AtlasError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for AtlasError {
    fn from(err: reqwest::Error) -> Self {
        AtlasError::Network {
            message: err.to_string(),
        }
    }
}

/// Requests section listings for one course and parses them.
pub struct AtlasClient {
    client: Client,
    config: AtlasConfig,
}

impl AtlasClient {
    /// Creates a new client.
    pub fn new(config: AtlasConfig) -> Result<Self, AtlasError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AtlasError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Fetches every section of a course.
    pub async fn fetch_sections(
        &self,
        term: &str,
        dept: &str,
        course: &str,
    ) -> Result<Vec<Section>, AtlasError> {
        self.request(term, dept, course, None).await
    }

    /// Fetches the section with `crn`, if the course lists it.
    pub async fn find_section(
        &self,
        term: &str,
        dept: &str,
        course: &str,
        crn: &str,
    ) -> Result<Option<Section>, AtlasError> {
        let sections = self.request(term, dept, course, Some(crn)).await?;
        Ok(sections.into_iter().next())
    }

    async fn request(
        &self,
        term: &str,
        dept: &str,
        course: &str,
        crn: Option<&str>,
    ) -> Result<Vec<Section>, AtlasError> {
        info!(term = %term, dept = %dept, course = %course, "Requesting section listing");

        let response = self
            .client
            .post(&self.config.section_url)
            .form(&section_form(term, dept, course))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(status = %status, "Section listing request failed");
            return Err(AtlasError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let sections = parse_section_bytes(&body, crn)?;

        info!(
            term = %term,
            dept = %dept,
            course = %course,
            "Parsed {} sections",
            sections.len()
        );
        Ok(sections)
    }
}

/// Builds the portal's search form for one course.
///
/// The portal expects the `dummy` placeholders ahead of the real values.
pub fn section_form(term: &str, dept: &str, course: &str) -> Vec<(&'static str, String)> {
    vec![
        ("sel_subj", "dummy".to_string()),
        ("bl_online", "FALSE".to_string()),
        ("sel_day", "dummy".to_string()),
        ("term", term.to_string()),
        ("sel_subj", dept.to_string()),
        ("sel_inst", "ANY".to_string()),
        ("sel_online", String::new()),
        ("sel_crse", course.to_string()),
        ("begin_hh", "0".to_string()),
        ("begin_mi", "0".to_string()),
        ("end_hh", "0".to_string()),
        ("end_mi", "0".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_form_order() {
        let form = section_form("202470", "CSCI", "132");
        let subjects: Vec<_> = form
            .iter()
            .filter(|(k, _)| *k == "sel_subj")
            .map(|(_, v)| v.as_str())
            .collect();

        assert_eq!(subjects, vec!["dummy", "CSCI"]);
        assert!(form.contains(&("term", "202470".to_string())));
        assert!(form.contains(&("sel_crse", "132".to_string())));
    }

    #[test]
    fn test_retryable() {
        assert!(AtlasError::Status { status: 503 }.is_retryable());
        assert!(!AtlasError::Status { status: 404 }.is_retryable());
        let parse = AtlasError::from(SectionParseError::IdentifierShape {
            cell_text: "CSCI132".to_string(),
            token_count: 1,
        });
        assert!(!parse.is_retryable());
    }

    #[test]
    fn test_client_builds_with_defaults() {
        assert!(AtlasClient::new(AtlasConfig::default()).is_ok());
    }
}
