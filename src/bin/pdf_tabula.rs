//! Extract tables from a PDF into CSV
//!
//! Usage:
//!   pdf_tabula input.pdf --output tables.csv
//!   pdf_tabula input.pdf --pages 3-40 --sensitivity high --harvest numbers/
//!
//! Exit codes: 0 on success, 2 on a usage error, 1 when extraction fails.

use pdf_tabula::config::{DetectionSensitivity, ExtractionConfig, PageRange};
use pdf_tabula::document::Document;
use pdf_tabula::error::{Error, ErrorKind};
use pdf_tabula::monitor::Progress;
use pdf_tabula::output::harvest::Category;
use pdf_tabula::output::{CsvSink, RowSink, SectionHarvester};
use pdf_tabula::pipeline::ExtractionJob;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

const USAGE: &str = "\
Usage: pdf_tabula <input.pdf> [options]

Options:
  --output FILE             CSV destination (default: stdout)
  --password P              user or owner password
  --pages A-B               one-based, inclusive page range
  --sensitivity LEVEL       low, medium or high
  --confidence X            demote tables scoring below X (0 to 1)
  --memory-ceiling BYTES    cancel when resident memory exceeds BYTES
  --timeout SECS            cancel after SECS seconds
  --workers N               page workers
  --config FILE.json        base configuration
  --harvest DIR             write section numbers to DIR/<category>.csv
  --log-file FILE           append log records to FILE
  --with-page-column        prefix rows with their page number
";

/// Progress is logged once per this many pages.
const PROGRESS_CHUNK: usize = 10;

struct CliArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    password: Option<String>,
    pages: Option<PageRange>,
    sensitivity: Option<DetectionSensitivity>,
    confidence: Option<f32>,
    memory_ceiling: Option<u64>,
    timeout: Option<Duration>,
    workers: Option<usize>,
    config: Option<PathBuf>,
    harvest: Option<PathBuf>,
    log_file: Option<PathBuf>,
    page_column: bool,
}

impl CliArgs {
    fn from_args(args: &[String]) -> Result<Self, String> {
        let mut cli = CliArgs {
            input: PathBuf::new(),
            output: None,
            password: None,
            pages: None,
            sensitivity: None,
            confidence: None,
            memory_ceiling: None,
            timeout: None,
            workers: None,
            config: None,
            harvest: None,
            log_file: None,
            page_column: false,
        };
        let mut input = None;

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || {
                i += 1;
                args.get(i).cloned().ok_or_else(|| format!("{} needs a value", flag))
            };
            match flag {
                "--output" | "-o" => cli.output = Some(PathBuf::from(value()?)),
                "--password" => cli.password = Some(value()?),
                "--pages" => cli.pages = Some(parse_pages(&value()?)?),
                "--sensitivity" => {
                    let v = value()?;
                    cli.sensitivity =
                        Some(DetectionSensitivity::from_name(&v).ok_or_else(|| format!("unknown sensitivity '{}'", v))?);
                },
                "--confidence" => cli.confidence = Some(parse_number(flag, &value()?)?),
                "--memory-ceiling" => cli.memory_ceiling = Some(parse_number(flag, &value()?)?),
                "--timeout" => {
                    let secs: f64 = parse_number(flag, &value()?)?;
                    if !(secs.is_finite() && secs >= 0.0) {
                        return Err(format!("--timeout must be a non-negative number, got {}", secs));
                    }
                    cli.timeout = Some(Duration::from_secs_f64(secs));
                },
                "--workers" => cli.workers = Some(parse_number(flag, &value()?)?),
                "--config" => cli.config = Some(PathBuf::from(value()?)),
                "--harvest" => cli.harvest = Some(PathBuf::from(value()?)),
                "--log-file" => cli.log_file = Some(PathBuf::from(value()?)),
                "--with-page-column" => cli.page_column = true,
                "--help" | "-h" => return Err(String::new()),
                other if other.starts_with('-') => return Err(format!("unknown option '{}'", other)),
                other => {
                    if input.is_some() {
                        return Err(format!("unexpected argument '{}'", other));
                    }
                    input = Some(PathBuf::from(other));
                },
            }
            i += 1;
        }

        cli.input = input.ok_or_else(|| "missing input file".to_string())?;
        Ok(cli)
    }

    fn extraction_config(&self) -> pdf_tabula::Result<ExtractionConfig> {
        let mut config = match &self.config {
            Some(path) => ExtractionConfig::from_json_file(path)?,
            None => ExtractionConfig::default(),
        };
        if let Some(password) = &self.password {
            config = config.with_password(password.clone());
        }
        if let Some(range) = self.pages {
            config = config.with_page_range(range);
        }
        if let Some(sensitivity) = self.sensitivity {
            config = config.with_sensitivity(sensitivity);
        }
        if let Some(confidence) = self.confidence {
            config = config.with_confidence_threshold(confidence);
        }
        if let Some(bytes) = self.memory_ceiling {
            config = config.with_memory_ceiling(bytes);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        config.validate()?;
        Ok(config)
    }
}

/// `A-B` or `A`, one-based and inclusive.
fn parse_pages(text: &str) -> Result<PageRange, String> {
    let (first, last) = match text.split_once('-') {
        Some((a, b)) => (a.trim(), b.trim()),
        None => (text.trim(), text.trim()),
    };
    let first: usize = parse_number("--pages", first)?;
    let last: usize = parse_number("--pages", last)?;
    if first == 0 || last < first {
        return Err(format!("invalid page range '{}'", text));
    }
    Ok(PageRange::new(first - 1, last - 1))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{} expects a number, got '{}'", flag, value))
}

fn init_logging(log_file: Option<&PathBuf>) -> io::Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        builder
            .target(env_logger::Target::Pipe(Box::new(file)))
            .format(|buf, record| writeln!(buf, "{} - {}", buf.timestamp_seconds(), record.args()));
    }
    builder.init();
    Ok(())
}

fn log_progress(progress: &Progress) {
    if progress.pages_completed % PROGRESS_CHUNK == 0 || progress.pages_completed == progress.pages_total {
        log::info!(
            "Processed {}/{} pages ({:.0}%) in {:.1}s",
            progress.pages_completed,
            progress.pages_total,
            progress.fraction() * 100.0,
            progress.elapsed.as_secs_f64()
        );
    }
}

fn open_sink(cli: &CliArgs) -> pdf_tabula::Result<Box<dyn RowSink>> {
    Ok(match &cli.output {
        Some(path) => Box::new(CsvSink::new(BufWriter::new(File::create(path)?)).with_page_column(cli.page_column)),
        None => Box::new(CsvSink::new(io::stdout().lock()).with_page_column(cli.page_column)),
    })
}

fn run(cli: &CliArgs) -> pdf_tabula::Result<()> {
    let config = cli.extraction_config()?;
    let doc = Document::open(&cli.input, config.password.as_deref()).map_err(Error::into_malformed)?;
    log::info!(
        "Opened {} ({} pages, PDF {}.{})",
        cli.input.display(),
        doc.page_count(),
        doc.version().0,
        doc.version().1
    );

    let sink = open_sink(cli)?;
    let mut harvester = cli.harvest.as_ref().map(|_| SectionHarvester::new());
    let report = match harvester.as_mut() {
        Some(harvester) => ExtractionJob::new(&doc, config, (sink, harvester))
            .with_observer(log_progress)
            .run()?,
        None => ExtractionJob::new(&doc, config, sink).with_observer(log_progress).run()?,
    };

    log::info!(
        "Wrote {} rows ({} table rows, {} tables, {} demoted) in {:.2}s",
        report.rows_written,
        report.table_rows,
        report.totals.emitted_tables,
        report.totals.demoted_tables,
        report.elapsed.as_secs_f64()
    );

    if let (Some(dir), Some(harvester)) = (&cli.harvest, harvester) {
        let numbers = harvester.into_report();
        for category in Category::ALL {
            log::info!("{}: {} numbers", category, numbers.count(category));
        }
        for path in numbers.write_csv_dir(dir)? {
            log::info!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Malformed => "malformed document",
        ErrorKind::Decryption => "decryption",
        ErrorKind::Timeout => "extraction timeout",
        ErrorKind::Sink => "sink write",
        ErrorKind::Config => "configuration",
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let cli = match CliArgs::from_args(&args) {
        Ok(cli) => cli,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("Error: {}\n", message);
            }
            eprint!("{}", USAGE);
            return ExitCode::from(2);
        },
    };

    if let Err(e) = init_logging(cli.log_file.as_ref()) {
        eprintln!("Error: cannot open log file: {}", e);
        return ExitCode::from(2);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.kind() == ErrorKind::Config => {
            eprintln!("Error ({}): {}", kind_label(e.kind()), e);
            ExitCode::from(2)
        },
        Err(e) => {
            log::error!("Extraction failed: {}", e);
            eprintln!("Error ({}): {}", kind_label(e.kind()), e);
            ExitCode::from(1)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("pdf_tabula").chain(list.iter().copied()).map(String::from).collect()
    }

    #[test]
    fn test_pages_are_one_based() {
        let range = parse_pages("3-40").unwrap();
        assert_eq!((range.start, range.end), (2, 39));
        let single = parse_pages("5").unwrap();
        assert_eq!((single.start, single.end), (4, 4));
        assert!(parse_pages("0-3").is_err());
        assert!(parse_pages("9-2").is_err());
        assert!(parse_pages("a-b").is_err());
    }

    #[test]
    fn test_from_args() {
        let cli = CliArgs::from_args(&args(&[
            "in.pdf",
            "-o",
            "out.csv",
            "--sensitivity",
            "high",
            "--timeout",
            "1.5",
            "--with-page-column",
        ]))
        .unwrap();
        assert_eq!(cli.input, PathBuf::from("in.pdf"));
        assert_eq!(cli.output, Some(PathBuf::from("out.csv")));
        assert_eq!(cli.sensitivity, Some(DetectionSensitivity::High));
        assert_eq!(cli.timeout, Some(Duration::from_millis(1500)));
        assert!(cli.page_column);
    }

    #[test]
    fn test_from_args_errors() {
        assert!(CliArgs::from_args(&args(&[])).is_err());
        assert!(CliArgs::from_args(&args(&["in.pdf", "--workers"])).is_err());
        assert!(CliArgs::from_args(&args(&["in.pdf", "--bogus"])).is_err());
        assert!(CliArgs::from_args(&args(&["a.pdf", "b.pdf"])).is_err());
        assert_eq!(CliArgs::from_args(&args(&["--help"])).err(), Some(String::new()));
    }

    #[test]
    fn test_cli_overrides_are_validated() {
        let cli = CliArgs::from_args(&args(&["in.pdf", "--confidence", "1.5"])).unwrap();
        let err = cli.extraction_config().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let cli = CliArgs::from_args(&args(&["in.pdf", "--pages", "2-3", "--workers", "2"])).unwrap();
        let config = cli.extraction_config().unwrap();
        assert_eq!(config.page_range, Some(PageRange::new(1, 2)));
        assert_eq!(config.workers, Some(2));
    }
}
