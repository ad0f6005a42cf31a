//! Section number harvesting over extracted documents.

mod common;

use common::{simple_document, text_at};
use pdf_tabula::config::ExtractionConfig;
use pdf_tabula::output::harvest::Category;
use pdf_tabula::output::{CsvSink, MemorySink, SectionHarvester, SectionMarkers};
use pdf_tabula::pipeline::extract_document;

fn markers() -> SectionMarkers {
    SectionMarkers {
        corrigenda: "CORRIGENDA".to_string(),
        registered: "REGISTERED".to_string(),
        renewed: "RENEWED".to_string(),
    }
}

fn lines(lines: &[&str]) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| text_at(40.0, 740.0 - 24.0 * i as f32, line))
        .collect()
}

fn journal() -> Vec<u8> {
    simple_document(&[
        lines(&[
            "Journal 1234567 12/03/2021 Acme",
            "CORRIGENDA",
            "Entry 2345678 corrected",
            "REGISTERED",
            "11111 22222 33333 44444 55555",
            "RENEWED",
            "Renewal 3456789 granted",
        ]),
        lines(&["Late 4567890 02/02/2022 Ltd", "Entry 2345678 corrected"]),
    ])
}

#[test]
fn test_harvest_sections_per_page() {
    let mut harvester = SectionHarvester::with_markers(markers());
    let mut rows = MemorySink::new();
    extract_document(journal(), ExtractionConfig::default(), (&mut rows, &mut harvester)).unwrap();
    assert!(rows.is_finalized());
    assert_eq!(rows.rows().len(), 9);

    let report = harvester.into_report();
    let numbers = |c| report.numbers(c).collect::<Vec<_>>();
    assert_eq!(numbers(Category::Advertisement), vec![1234567, 4567890]);
    assert_eq!(numbers(Category::Corrigenda), vec![2345678]);
    assert_eq!(numbers(Category::Rc), vec![11111, 22222, 33333, 44444, 55555]);
    assert_eq!(numbers(Category::Renewal), vec![3456789]);
}

#[test]
fn test_harvest_csv_files() {
    let mut harvester = SectionHarvester::with_markers(markers());
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("rows.csv");
    let csv = CsvSink::create(&csv_path).unwrap();
    extract_document(journal(), ExtractionConfig::default(), (csv, &mut harvester)).unwrap();

    let rows = std::fs::read_to_string(&csv_path).unwrap();
    assert!(rows.starts_with("Journal 1234567 12/03/2021 Acme\r\nCORRIGENDA\r\n"));

    let out = dir.path().join("numbers");
    let written = harvester.into_report().write_csv_dir(&out).unwrap();
    assert_eq!(written.len(), 4);
    let ads = std::fs::read_to_string(out.join("Advertisement.csv")).unwrap();
    assert_eq!(ads, "Numbers\r\n1234567\r\n4567890\r\n");
    assert!(out.join("RC.csv").exists());
}

#[test]
fn test_default_markers_find_nothing_in_plain_text() {
    let mut harvester = SectionHarvester::new();
    let doc = simple_document(&[lines(&["Nothing to see here", "Still nothing"])]);
    extract_document(doc, ExtractionConfig::default(), &mut harvester).unwrap();
    assert!(harvester.report().is_empty());
}
