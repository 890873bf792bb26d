/// Section listing parser
///
/// The portal lays out each section over two adjacent table rows: the first
/// row holds the identifier, name, CRN, seat counts and instructor, the
/// second holds department, type, time, location and credits. Nothing marks
/// the pairs apart from their cell counts, so a pair of rows is taken to be a
/// section exactly when their cells add up to [`ROW_PAIR_CELLS`].
mod error;
mod types;

pub use error::SectionParseError;
pub use types::Section;

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

/// Combined number of `<td>` cells in the two rows of one section.
pub const ROW_PAIR_CELLS: usize = 15;

// Static selectors for parsing - compiled once
static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Text of each cell in a row, untrimmed.
type RowCells = Vec<String>;

/// Parses a section listing page.
///
/// # Arguments
/// * `html` - The listing page
/// * `crn` - If set (and non-empty), stop at the first section with this CRN
///
/// # Returns
/// * `Ok(Vec<Section>)` - Every section in document order, or at most one
///   section when filtering by CRN. Empty when nothing matched.
/// * `Err(SectionParseError)` - If a matching row pair has an identifier
///   that does not split into exactly three tokens
pub fn parse_sections(html: &str, crn: Option<&str>) -> Result<Vec<Section>, SectionParseError> {
    let document = Html::parse_document(html);
    let target = crn.filter(|c| !c.is_empty());

    let mut scanner = RowPairScanner::default();
    let mut sections = Vec::new();

    for row in document.select(&ROW_SELECTOR) {
        let Some((first, second)) = scanner.push(row_cells(&row)) else {
            continue;
        };

        let section = section_from_rows(&first, &second)?;

        match target {
            Some(crn) if section.crn == crn => {
                debug!(crn = %crn, "Found requested section");
                return Ok(vec![section]);
            }
            Some(_) => {}
            None => sections.push(section),
        }
    }

    debug!("Parsed {} sections from listing", sections.len());
    Ok(sections)
}

/// Parses a raw response body, rejecting bodies that are not valid UTF-8.
pub fn parse_section_bytes(
    body: &[u8],
    crn: Option<&str>,
) -> Result<Vec<Section>, SectionParseError> {
    let html = std::str::from_utf8(body).map_err(|e| SectionParseError::UnreadableDocument {
        message: e.to_string(),
    })?;
    parse_sections(html, crn)
}

/// Collects the text of every `<td>` below a `<tr>`.
fn row_cells(row: &ElementRef) -> RowCells {
    row.select(&CELL_SELECTOR)
        .map(|cell| cell.text().collect::<String>())
        .collect()
}

/// Where the scan is within a two-row record.
#[derive(Debug, Default)]
enum ScanState {
    #[default]
    AwaitingFirstRow,
    AwaitingSecondRow(RowCells),
}

/// Feeds rows one at a time and yields the pairs that match the fingerprint.
///
/// Every adjacent pair `(i, i + 1)` is checked: each row becomes the first
/// row of the next candidate pair whether or not it just completed one. A
/// trailing row is never paired with nothing.
#[derive(Debug, Default)]
struct RowPairScanner {
    state: ScanState,
}

impl RowPairScanner {
    fn push(&mut self, row: RowCells) -> Option<(RowCells, RowCells)> {
        let previous = std::mem::replace(&mut self.state, ScanState::AwaitingSecondRow(row));
        let ScanState::AwaitingSecondRow(first) = previous else {
            return None;
        };
        let ScanState::AwaitingSecondRow(second) = &self.state else {
            return None;
        };

        (first.len() + second.len() == ROW_PAIR_CELLS).then(|| (first, second.clone()))
    }
}

/// Builds a section from a fingerprint-matching row pair.
fn section_from_rows(first: &[String], second: &[String]) -> Result<Section, SectionParseError> {
    let cell = |row: &[String], idx: usize| {
        row.get(idx)
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    };

    let [dept_abbr, course_number, section_number] =
        split_identifier(first.get(1).map(String::as_str).unwrap_or_default())?;

    let mut credits = cell(second, 4);
    if credits.is_empty() {
        credits = "0".to_string();
    }

    Ok(Section {
        dept_abbr,
        course_number,
        section_number,
        course_name: cell(first, 2),
        crn: cell(first, 3),
        total_seats: cell(first, 4),
        taken_seats: cell(first, 5),
        available_seats: cell(first, 6),
        instructor: cell(first, 7),
        dept_name: cell(second, 0),
        course_type: cell(second, 1),
        time: cell(second, 2),
        location: cell(second, 3),
        credits,
    })
}

/// Splits an identifier cell such as "CSCI 132 - 001" into its three parts.
fn split_identifier(text: &str) -> Result<[String; 3], SectionParseError> {
    match alphanumeric_runs(text).as_slice() {
        [dept, course, section] => Ok([dept.to_string(), course.to_string(), section.to_string()]),
        tokens => Err(SectionParseError::IdentifierShape {
            cell_text: text.trim().to_string(),
            token_count: tokens.len(),
        }),
    }
}

/// Returns the maximal runs of ASCII letters and digits in `text`.
pub fn alphanumeric_runs(text: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = None;

    for (idx, ch) in text.char_indices() {
        match (ch.is_ascii_alphanumeric(), start) {
            (true, None) => start = Some(idx),
            (false, Some(from)) => {
                runs.push(&text[from..idx]);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(from) = start {
        runs.push(&text[from..]);
    }

    runs
}
