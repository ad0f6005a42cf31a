//! Section number harvesting for trade mark journals.
//!
//! A journal page lists application numbers under several headings. The
//! harvester reads every emitted row as a line of text and collects the
//! numbers of four categories:
//!
//! - **Advertisement**: lines before the corrigenda heading, with a number
//!   followed by a `dd/mm/yyyy` date.
//! - **Corrigenda**: lines after the corrigenda heading and before the
//!   "registered" notice.
//! - **RC**: lines before the "renewed" notice made of exactly five numeric
//!   columns.
//! - **Renewal**: every number of five or more digits after the "renewed"
//!   notice.
//!
//! Section state starts over on every page.

use super::{RowSink, SinkError};
use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref ADVERTISEMENT: Regex = Regex::new(r" (\d{5,})\s+\d{2}/\d{2}/\d{4} ").unwrap();
    static ref CORRIGENDA: Regex = Regex::new(r" (\d{5,})\s*").unwrap();
    static ref RENEWAL_NUMBER: Regex = Regex::new(r"\b(\d{5,})\b").unwrap();
    static ref RENEWAL_APPLICATION: Regex = Regex::new(r"Application No\s+(\d{5,}) ").unwrap();
}

/// Number category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Advertised applications
    Advertisement,
    /// Corrected entries
    Corrigenda,
    /// Registration certificates
    Rc,
    /// Renewed registrations
    Renewal,
}

impl Category {
    /// All categories in report order.
    pub const ALL: [Category; 4] = [
        Category::Advertisement,
        Category::Corrigenda,
        Category::Rc,
        Category::Renewal,
    ];

    /// Display name, also the CSV file stem.
    pub fn name(self) -> &'static str {
        match self {
            Category::Advertisement => "Advertisement",
            Category::Corrigenda => "Corrigenda",
            Category::Rc => "RC",
            Category::Renewal => "Renewal",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Heading texts that delimit the sections. A line belongs to a heading
/// when it contains the marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionMarkers {
    /// Ends the advertisement section and opens corrigenda
    pub corrigenda: String,
    /// Ends the corrigenda section
    pub registered: String,
    /// Ends the RC section and opens renewals
    pub renewed: String,
}

impl Default for SectionMarkers {
    fn default() -> Self {
        Self {
            corrigenda: "CORRIGENDA".to_string(),
            registered: "Following Trade Mark applications have been Registered and registration certificates are \
                         available on the official website"
                .to_string(),
            renewed: "Following Trade Marks Registration Renewed for a Period Of Ten Years".to_string(),
        }
    }
}

/// Harvested numbers, sorted and de-duplicated per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    numbers: BTreeMap<Category, BTreeSet<u64>>,
}

impl HarvestReport {
    /// Numbers of one category.
    pub fn numbers(&self, category: Category) -> impl Iterator<Item = u64> + '_ {
        self.numbers.get(&category).into_iter().flatten().copied()
    }

    /// Distinct numbers in a category.
    pub fn count(&self, category: Category) -> usize {
        self.numbers.get(&category).map_or(0, BTreeSet::len)
    }

    /// Nothing was harvested.
    pub fn is_empty(&self) -> bool {
        self.numbers.values().all(BTreeSet::is_empty)
    }

    fn insert(&mut self, category: Category, text: &str) {
        match text.parse::<u64>() {
            Ok(n) => {
                self.numbers.entry(category).or_default().insert(n);
            },
            Err(_) => log::debug!("Ignoring unparseable {} number {:?}", category, text),
        }
    }

    /// Write `<Category>.csv` with a `Numbers` header for each non-empty
    /// category. Returns the files written.
    pub fn write_csv_dir(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for category in Category::ALL {
            let Some(numbers) = self.numbers.get(&category).filter(|n| !n.is_empty()) else {
                continue;
            };
            let path = dir.join(format!("{}.csv", category.name()));
            let mut writer = ::csv::WriterBuilder::new()
                .terminator(::csv::Terminator::CRLF)
                .from_path(&path)
                .map_err(csv_error)?;
            writer.write_record(["Numbers"]).map_err(csv_error)?;
            for n in numbers {
                writer.write_record([n.to_string()]).map_err(csv_error)?;
            }
            writer.flush()?;
            log::info!("Wrote {} {} numbers to {}", numbers.len(), category, path.display());
            written.push(path);
        }
        Ok(written)
    }
}

fn csv_error(e: ::csv::Error) -> crate::error::Error {
    crate::error::Error::Io(e.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Corrigenda {
    Before,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct PageState {
    page: usize,
    advertisement_open: bool,
    corrigenda: Corrigenda,
    rc_open: bool,
    renewal_open: bool,
}

impl PageState {
    fn new(page: usize) -> Self {
        Self {
            page,
            advertisement_open: true,
            corrigenda: Corrigenda::Before,
            rc_open: true,
            renewal_open: false,
        }
    }
}

/// A [`RowSink`] collecting section numbers.
#[derive(Debug, Clone, Default)]
pub struct SectionHarvester {
    markers: SectionMarkers,
    state: Option<PageState>,
    report: HarvestReport,
    lines_seen: usize,
}

impl SectionHarvester {
    /// Harvester using the standard journal headings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Harvester using custom headings.
    pub fn with_markers(markers: SectionMarkers) -> Self {
        Self {
            markers,
            ..Self::default()
        }
    }

    /// Numbers collected so far.
    pub fn report(&self) -> &HarvestReport {
        &self.report
    }

    /// Take the collected numbers.
    pub fn into_report(self) -> HarvestReport {
        self.report
    }

    /// Feed one line of text from `page`.
    pub fn scan_line(&mut self, page: usize, line: &str) {
        let mut state = match self.state {
            Some(s) if s.page == page => s,
            _ => PageState::new(page),
        };
        let line = line.trim();
        self.lines_seen += 1;

        let is_corrigenda = line.contains(self.markers.corrigenda.as_str());
        let is_registered = line.contains(self.markers.registered.as_str());
        let is_renewed = line.contains(self.markers.renewed.as_str());

        if state.advertisement_open {
            if is_corrigenda {
                state.advertisement_open = false;
            } else {
                for caps in ADVERTISEMENT.captures_iter(line) {
                    self.report.insert(Category::Advertisement, &caps[1]);
                }
            }
        }

        match state.corrigenda {
            Corrigenda::Closed => {},
            _ if is_corrigenda => state.corrigenda = Corrigenda::Open,
            _ if is_registered => state.corrigenda = Corrigenda::Closed,
            Corrigenda::Open => {
                for caps in CORRIGENDA.captures_iter(line) {
                    self.report.insert(Category::Corrigenda, &caps[1]);
                }
            },
            Corrigenda::Before => {},
        }

        if state.rc_open {
            if is_renewed {
                state.rc_open = false;
            } else {
                let columns: Vec<&str> = line.split_whitespace().collect();
                if columns.len() == 5 && columns.iter().all(|c| c.chars().all(|ch| ch.is_ascii_digit())) {
                    for c in columns {
                        self.report.insert(Category::Rc, c);
                    }
                }
            }
        }

        if is_renewed {
            state.renewal_open = true;
        } else if state.renewal_open {
            for caps in RENEWAL_NUMBER.captures_iter(line) {
                self.report.insert(Category::Renewal, &caps[1]);
            }
            for caps in RENEWAL_APPLICATION.captures_iter(line) {
                self.report.insert(Category::Renewal, &caps[1]);
            }
        }

        self.state = Some(state);
    }
}

impl RowSink for SectionHarvester {
    fn append_row(&mut self, page_index: usize, row: &[String], _is_table: bool) -> std::result::Result<(), SinkError> {
        let line = row.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect::<Vec<_>>().join(" ");
        self.scan_line(page_index, &line);
        Ok(())
    }

    fn finalize(&mut self) -> std::result::Result<(), SinkError> {
        let counts: Vec<String> = Category::ALL
            .iter()
            .map(|&c| format!("{}={}", c, self.report.count(c)))
            .collect();
        log::info!("Harvested {} lines: {}", self.lines_seen, counts.join(", "));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harvest(pages: &[&[&str]]) -> HarvestReport {
        let mut h = SectionHarvester::new();
        for (i, lines) in pages.iter().enumerate() {
            for line in lines.iter() {
                h.scan_line(i, line);
            }
        }
        h.into_report()
    }

    #[test]
    fn test_advertisement_stops_at_corrigenda() {
        let report = harvest(&[&[
            "Class 5 1234567 12/03/2021 Acme Ltd",
            "1234568 12/03/2021 at line start",
            "CORRIGENDA",
            "Class 9 7654321 01/01/2020 late",
        ]]);
        assert_eq!(report.numbers(Category::Advertisement).collect::<Vec<_>>(), vec![1234567]);
    }

    #[test]
    fn test_corrigenda_section() {
        let markers = SectionMarkers::default();
        let registered = format!("{} below", markers.registered);
        let report = harvest(&[&[
            "before 11111 x",
            "CORRIGENDA",
            "No. 22222 corrected 33333",
            registered.as_str(),
            "after 44444 x",
        ]]);
        assert_eq!(report.numbers(Category::Corrigenda).collect::<Vec<_>>(), vec![22222, 33333]);
    }

    #[test]
    fn test_rc_and_renewal() {
        let markers = SectionMarkers::default();
        let report = harvest(&[&[
            "100001 100002 100003 100004 100005",
            "100006 100007 100008 100009",
            markers.renewed.as_str(),
            "Application No 5550001 renewed for 5550002",
            "200001 200002 200003 200004 200005",
        ]]);
        assert_eq!(report.count(Category::Rc), 5);
        assert_eq!(
            report.numbers(Category::Renewal).collect::<Vec<_>>(),
            vec![200001, 200002, 200003, 200004, 200005, 5550001, 5550002]
        );
    }

    #[test]
    fn test_state_resets_per_page() {
        let report = harvest(&[
            &["CORRIGENDA", "fix 12345"],
            &["page two 67890 01/02/2023 entry"],
        ]);
        assert_eq!(report.numbers(Category::Corrigenda).collect::<Vec<_>>(), vec![12345]);
        assert_eq!(report.numbers(Category::Advertisement).collect::<Vec<_>>(), vec![67890]);
    }

    #[test]
    fn test_rows_joined_and_written() {
        let mut h = SectionHarvester::new();
        let row: Vec<String> = ["", "Class 3", "9876543", "05/06/2022", "Name"].iter().map(|s| s.to_string()).collect();
        h.append_row(0, &row, true).unwrap();
        h.append_row(0, &row, true).unwrap();
        h.finalize().unwrap();
        let report = h.into_report();
        assert_eq!(report.count(Category::Advertisement), 1);

        let dir = tempfile::tempdir().unwrap();
        let files = report.write_csv_dir(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("Advertisement.csv")]);
        let text = std::fs::read_to_string(&files[0]).unwrap();
        assert_eq!(text, "Numbers\r\n9876543\r\n");
        assert!(HarvestReport::default().write_csv_dir(dir.path()).unwrap().is_empty());
    }
}
