//! Library reports in CSV and plain-text form.

use crate::document::{Document, Flag, FlagId};
use crate::pagination::paginate;
use crate::store::DocumentStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

const CSV_HEADER: &str =
    "ID,Document Name,Flag,Imported Date,Last Page Index,Content Length,Reading Progress";
const NO_FLAG: &str = "No Flag";
const RULE: &str = "═══════════════════════════════════════════════════";
const SECTION_RULE: &str = "───────────────────────────────────────────────────";
const RECENT_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Csv,
    Text,
}

impl ReportKind {
    pub fn extension(self) -> &'static str {
        match self {
            ReportKind::Csv => "csv",
            ReportKind::Text => "txt",
        }
    }
}

impl FromStr for ReportKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "csv" => Ok(ReportKind::Csv),
            "txt" | "text" => Ok(ReportKind::Text),
            other => anyhow::bail!("unknown report kind {other:?} (expected csv or txt)"),
        }
    }
}

/// Percentage of the document read, from its saved page and real page count.
pub fn reading_progress(document: &Document) -> f64 {
    let Some(last) = document.last_page_index.filter(|last| *last > 0) else {
        return 0.0;
    };
    let pages = paginate(&document.content).len().max(1);
    (((last + 1) as f64) * 100.0 / pages as f64).min(100.0)
}

/// Quote a CSV field when it contains a comma, quote or newline.
pub fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn report_file_name(kind: ReportKind, now: DateTime<Utc>) -> String {
    format!(
        "DocumentReport_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        kind.extension()
    )
}

fn flag_names(flags: &[Flag]) -> HashMap<FlagId, &str> {
    flags
        .iter()
        .filter_map(|flag| flag.id.map(|id| (id, flag.name.as_str())))
        .collect()
}

fn flag_name<'a>(names: &HashMap<FlagId, &'a str>, document: &Document) -> Option<&'a str> {
    document.flag_id.and_then(|id| names.get(&id).copied())
}

fn sorted_by_name(documents: &[Document]) -> Vec<&Document> {
    let mut sorted: Vec<&Document> = documents.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
}

pub fn build_csv(documents: &[Document], flags: &[Flag], now: DateTime<Utc>) -> String {
    let names = flag_names(flags);
    let mut csv = String::new();
    let _ = writeln!(
        csv,
        "# Document Report - Generated on {}",
        now.format("%Y-%m-%d %H:%M:%S")
    );
    csv.push('\n');
    csv.push_str(CSV_HEADER);
    csv.push('\n');

    for document in sorted_by_name(documents) {
        let flag = flag_name(&names, document).unwrap_or(NO_FLAG);
        let _ = writeln!(
            csv,
            "{},{},{},{},{},{},{:.1}%",
            document.id.map(|id| id.0).unwrap_or(0),
            escape_csv_field(&document.name),
            escape_csv_field(flag),
            document.imported_date.format("%Y-%m-%d %H:%M"),
            document.last_page_index.unwrap_or(0),
            document.content.chars().count(),
            reading_progress(document),
        );
    }
    csv
}

pub fn build_text(documents: &[Document], flags: &[Flag], now: DateTime<Utc>) -> String {
    let names = flag_names(flags);
    let sorted = sorted_by_name(documents);
    let recent_cutoff = now - Duration::days(RECENT_DAYS);

    let mut report = String::new();
    let _ = writeln!(report, "{RULE}");
    let _ = writeln!(report, "       READ REPEAT - DOCUMENT REPORT");
    let _ = writeln!(report, "{RULE}");
    let _ = writeln!(report, "Generated on: {}", now.format("%Y-%m-%d %H:%M:%S"));
    report.push('\n');

    let _ = writeln!(report, "SUMMARY");
    let _ = writeln!(report, "{SECTION_RULE}");
    let _ = writeln!(report, "Total Documents: {}", sorted.len());
    let _ = writeln!(
        report,
        "Flagged Documents: {}",
        sorted.iter().filter(|doc| flag_name(&names, doc).is_some()).count()
    );
    let _ = writeln!(
        report,
        "Recently Imported ({RECENT_DAYS} days): {}",
        sorted
            .iter()
            .filter(|doc| doc.imported_date >= recent_cutoff)
            .count()
    );
    if !sorted.is_empty() {
        let average =
            sorted.iter().map(|doc| reading_progress(doc)).sum::<f64>() / sorted.len() as f64;
        let _ = writeln!(report, "Average Reading Progress: {average:.1}%");
    }
    report.push('\n');

    let _ = writeln!(report, "DOCUMENTS LIST");
    let _ = writeln!(report, "{SECTION_RULE}");
    for document in &sorted {
        let _ = writeln!(report, "• {}", document.name);
        let _ = writeln!(report, "  Flag: {}", flag_name(&names, document).unwrap_or(NO_FLAG));
        let _ = writeln!(
            report,
            "  Imported: {}",
            document.imported_date.format("%m/%d/%Y %H:%M")
        );
        let _ = writeln!(
            report,
            "  Last Page: {}",
            document.last_page_index.map(|page| page + 1).unwrap_or(1)
        );
        let _ = writeln!(
            report,
            "  Content Length: {} characters",
            group_thousands(document.content.chars().count())
        );
        let _ = writeln!(
            report,
            "  Reading Progress: {:.1}%",
            reading_progress(document)
        );
        report.push('\n');
    }

    let mut by_flag: BTreeMap<&str, usize> = BTreeMap::new();
    for document in &sorted {
        if let Some(flag) = flag_name(&names, document) {
            *by_flag.entry(flag).or_default() += 1;
        }
    }
    if !by_flag.is_empty() {
        let _ = writeln!(report, "DOCUMENTS BY FLAG");
        let _ = writeln!(report, "{SECTION_RULE}");
        for (flag, count) in &by_flag {
            let percentage = (*count as f64) * 100.0 / sorted.len() as f64;
            let _ = writeln!(report, "• {flag}: {count} documents ({percentage:.1}%)");
        }
    }

    report.push('\n');
    let _ = writeln!(report, "{RULE}");
    let _ = writeln!(report, "         End of Report");
    let _ = writeln!(report, "{RULE}");
    report
}

fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Build a report over the whole library and write it into `dir`.
pub fn write_report<D: DocumentStore + ?Sized>(
    store: &D,
    dir: &Path,
    kind: ReportKind,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let documents = store.list_documents().context("Failed to list documents")?;
    let flags = store.list_flags().context("Failed to list flags")?;
    let contents = match kind {
        ReportKind::Csv => build_csv(&documents, &flags, now),
        ReportKind::Text => build_text(&documents, &flags, now),
    };

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report dir {}", dir.display()))?;
    let path = dir.join(report_file_name(kind, now));
    fs::write(&path, contents)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    info!(
        path = %path.display(),
        ?kind,
        documents = documents.len(),
        "Report written"
    );
    Ok(path)
}
