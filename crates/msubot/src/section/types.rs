/// Types for scraped section data
use serde::{Deserialize, Serialize};

/// One course section as listed by the registration portal.
///
/// Seat counts are kept as the portal prints them; nothing here is
/// persisted by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub dept_abbr: String,     // e.g., "CSCI"
    pub course_number: String, // e.g., "132"
    pub section_number: String, // e.g., "001"
    pub course_name: String,
    pub crn: String,
    pub total_seats: String,
    pub taken_seats: String,
    pub available_seats: String,
    pub instructor: String,
    pub dept_name: String,
    pub course_type: String, // e.g., "Lecture", "Recitation"
    pub time: String,
    pub location: String,
    /// Never empty; recitations that list no credits read as "0".
    pub credits: String,
}

impl Section {
    /// Human readable course code, e.g. "CSCI 132-001".
    pub fn course_code(&self) -> String {
        format!(
            "{} {}-{}",
            self.dept_abbr, self.course_number, self.section_number
        )
    }
}
