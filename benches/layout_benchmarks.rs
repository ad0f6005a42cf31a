//! Benchmarks for table detection and reconstruction.
//!
//! Run with: cargo bench --bench layout_benchmarks
//!
//! Pages are built directly from fragments and rulings so the numbers
//! cover layout analysis only, plus one end-to-end run over a generated
//! document.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pdf_tabula::config::{ExtractionConfig, LayoutConfig};
use pdf_tabula::geometry::Rect;
use pdf_tabula::layout::LayoutAnalyzer;
use pdf_tabula::output::MemorySink;
use pdf_tabula::page::{Page, RulingLine};
use pdf_tabula::pipeline::extract_document;

fn push_text(page: &mut Page, text: &str, x: f32, baseline: f32) {
    let width = 5.0 * text.chars().count() as f32;
    page.push_fragment(
        Rect::new(x, baseline - 2.0, x + width, baseline + 8.0),
        text.to_string(),
        10.0,
        baseline,
    );
}

/// A fully ruled grid of `rows x columns` 60x20 cells.
fn ruled_page(rows: usize, columns: usize) -> Page {
    let mut page = Page::new(0, 612.0, 792.0);
    let (x0, top) = (20.0, 780.0);
    let right = x0 + 60.0 * columns as f32;
    let bottom = top - 20.0 * rows as f32;
    for r in 0..=rows {
        page.push_ruling(RulingLine::horizontal(top - 20.0 * r as f32, x0, right, 0.5));
    }
    for c in 0..=columns {
        page.push_ruling(RulingLine::vertical(x0 + 60.0 * c as f32, bottom, top, 0.5));
    }
    for r in 0..rows {
        for c in 0..columns {
            push_text(&mut page, &format!("{}.{}", r, c), x0 + 60.0 * c as f32 + 4.0, top - 20.0 * r as f32 - 14.0);
        }
    }
    page
}

/// Text-only table aligned on `columns` fixed positions.
fn whitespace_page(rows: usize, columns: usize) -> Page {
    let mut page = Page::new(0, 612.0, 792.0);
    for r in 0..rows {
        for c in 0..columns {
            push_text(&mut page, &format!("v{}", r * columns + c), 20.0 + 70.0 * c as f32, 780.0 - 14.0 * r as f32);
        }
    }
    page
}

fn bench_ruled_tables(c: &mut Criterion) {
    let analyzer = LayoutAnalyzer::new(LayoutConfig::default(), 0.7, 0.5);
    let mut group = c.benchmark_group("ruled_table");
    for rows in [10usize, 30] {
        let page = ruled_page(rows, 8);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &page, |b, page| {
            b.iter(|| analyzer.analyze(black_box(page)));
        });
    }
    group.finish();
}

fn bench_whitespace_tables(c: &mut Criterion) {
    let analyzer = LayoutAnalyzer::new(LayoutConfig::default(), 0.7, 0.5);
    let mut group = c.benchmark_group("whitespace_table");
    for rows in [10usize, 50] {
        let page = whitespace_page(rows, 6);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &page, |b, page| {
            b.iter(|| analyzer.analyze(black_box(page)));
        });
    }
    group.finish();
}

/// Minimal document with `pages` pages, each holding one ruled table.
fn create_test_pdf(pages: usize) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            (0..pages).map(|i| format!("{} 0 R", 4 + 2 * i)).collect::<Vec<_>>().join(" "),
            pages
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for i in 0..pages {
        let mut content = String::from("0.5 w ");
        for r in 0..=5 {
            let y = 700 - 20 * r;
            content.push_str(&format!("100 {} m 400 {} l S ", y, y));
        }
        for x in [100, 200, 300, 400] {
            content.push_str(&format!("{} 600 m {} 700 l S ", x, x));
        }
        for r in 0..5 {
            for c in 0..3 {
                content.push_str(&format!(
                    "BT /F1 10 Tf {} {} Td (p{}r{}c{}) Tj ET ",
                    104 + 100 * c,
                    686 - 20 * r,
                    i,
                    r,
                    c
                ));
            }
        }
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        objects.push(format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content));
    }

    let mut out = b"%PDF-1.7\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

fn bench_full_pipeline(c: &mut Criterion) {
    let pdf = create_test_pdf(20);
    let mut group = c.benchmark_group("extract_document");
    for workers in [1usize, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter(|| {
                let mut sink = MemorySink::new();
                let config = ExtractionConfig::default().with_workers(workers);
                extract_document(black_box(pdf.clone()), config, &mut sink).unwrap();
                sink.rows().len()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ruled_tables, bench_whitespace_tables, bench_full_pipeline);
criterion_main!(benches);
