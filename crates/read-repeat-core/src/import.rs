//! Document import.
//!
//! Plain text is read directly, EPUB chapters are walked in spine order and
//! stripped of markup, and DOCX/PDF are converted by external tools whose
//! output is cached per source file. Everything is normalized the same way
//! before it reaches the library.

use crate::cache::{ConversionCache, source_signature};
use crate::cancellation::CancellationToken;
use crate::document::{Document, FlagId};
use crate::store::DocumentStore;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use epub::doc::EpubDoc;
use scraper::{ElementRef, Html, Node};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["txt", "md", "docx", "epub", "pdf"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Text,
    Markdown,
    Docx,
    Epub,
    Pdf,
}

impl SourceFormat {
    /// Format for `path` by extension, matched case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "docx" => Some(Self::Docx),
            "epub" => Some(Self::Epub),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

pub fn is_supported(path: &Path) -> bool {
    SourceFormat::from_path(path).is_some()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedText {
    pub name: String,
    pub text: String,
    pub format: SourceFormat,
}

#[derive(Debug, Clone)]
pub struct ImportFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub imported: Vec<Document>,
    pub failures: Vec<ImportFailure>,
}

/// Read `path` and return its normalized text.
pub fn load_text(path: &Path, cache: &ConversionCache) -> Result<ImportedText> {
    load_text_with_cancel(path, cache, None)
}

pub fn load_text_with_cancel(
    path: &Path,
    cache: &ConversionCache,
    cancel: Option<&CancellationToken>,
) -> Result<ImportedText> {
    let format = SourceFormat::from_path(path)
        .with_context(|| format!("Unsupported file type: {}", path.display()))?;
    check_cancelled(cancel, "import_start")?;

    let raw = match format {
        SourceFormat::Text => read_plain(path)?,
        SourceFormat::Markdown => match convert_with_pandoc(path, cache) {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    "Pandoc markdown conversion failed, falling back to raw markdown: {err}"
                );
                read_plain(path)?
            }
        },
        SourceFormat::Docx => convert_with_pandoc(path, cache)?,
        SourceFormat::Pdf => convert_with_pdftotext(path, cache)?,
        SourceFormat::Epub => load_epub(path, cancel)?,
    };
    check_cancelled(cancel, "import_normalize")?;

    let text = normalize_text(&raw);
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    info!(
        path = %path.display(),
        ?format,
        total_chars = text.len(),
        "Imported document text"
    );
    Ok(ImportedText { name, text, format })
}

fn check_cancelled(cancel: Option<&CancellationToken>, stage: &'static str) -> Result<()> {
    match cancel {
        Some(token) => token.check_cancelled(stage),
        None => Ok(()),
    }
}

/// Import every path into `store`, tagging each document with `flag`.
/// A failing file is recorded and the batch moves on.
pub fn import_batch<D: DocumentStore + ?Sized>(
    store: &D,
    paths: &[PathBuf],
    flag: Option<FlagId>,
    cache: &ConversionCache,
) -> BatchReport {
    let mut report = BatchReport::default();
    for path in paths {
        match import_one(store, path, flag, cache) {
            Ok(document) => report.imported.push(document),
            Err(err) => {
                warn!(path = %path.display(), "Import failed: {err:#}");
                report.failures.push(ImportFailure {
                    path: path.clone(),
                    error: format!("{err:#}"),
                });
            }
        }
    }
    info!(
        imported = report.imported.len(),
        failed = report.failures.len(),
        "Batch import finished"
    );
    report
}

fn import_one<D: DocumentStore + ?Sized>(
    store: &D,
    path: &Path,
    flag: Option<FlagId>,
    cache: &ConversionCache,
) -> Result<Document> {
    let imported = load_text(path, cache)?;
    let mut document = Document::new(
        imported.name,
        path.display().to_string(),
        imported.text,
        Utc::now(),
    );
    document.flag_id = flag;
    store
        .save_document(&mut document)
        .with_context(|| format!("Failed to store {}", path.display()))?;
    Ok(document)
}

fn read_plain(path: &Path) -> Result<String> {
    info!(path = %path.display(), "Loading plain text content");
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Strip a BOM, unify line endings to `\n` and compose to NFC.
pub fn normalize_text(raw: &str) -> String {
    let without_bom = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    without_bom
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .nfc()
        .collect()
}

fn load_epub(path: &Path, cancel: Option<&CancellationToken>) -> Result<String> {
    info!(path = %path.display(), "Loading EPUB content");
    let mut doc =
        EpubDoc::new(path).with_context(|| format!("Failed to open EPUB at {}", path.display()))?;

    let mut combined = String::new();
    let mut chapters = 0usize;

    while let Some((chapter, _mime)) = doc.get_current_str() {
        check_cancelled(cancel, "epub_chapter")?;
        chapters += 1;
        let plain = html_to_text(&chapter);
        debug!(chapter = chapters, added_chars = plain.len(), "Parsed chapter");
        if !plain.is_empty() {
            if !combined.is_empty() {
                combined.push_str("\n\n");
            }
            combined.push_str(&plain);
        }
        if !doc.go_next() {
            break;
        }
    }

    info!(
        chapters,
        total_chars = combined.len(),
        "Finished loading EPUB content"
    );
    Ok(combined)
}

/// Elements whose whole subtree never reaches the reader.
const DROPPED_ELEMENTS: [&str; 8] = [
    "head", "script", "style", "nav", "header", "footer", "template", "noscript",
];

/// Elements that start and end a paragraph.
const BLOCK_ELEMENTS: [&str; 24] = [
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "dl", "dt", "dd",
    "blockquote", "section", "article", "aside", "table", "tr", "pre", "hr", "figure",
    "figcaption",
];

/// Reduce an XHTML chapter to plain text with blank lines between blocks.
///
/// The chapter goes through a real HTML parser, so attribute values never
/// leak into the text and entities are decoded the way browsers do.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = BlockText::default();
    collect_text(document.root_element(), &mut text);
    text.finish()
}

fn collect_text(element: ElementRef<'_>, out: &mut BlockText) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(tag) => {
                let name = tag.name();
                if DROPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push_str("\n");
                    continue;
                }
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.end_block();
                }
                collect_text(child, out);
                if block {
                    out.end_block();
                }
            }
            _ => {}
        }
    }
}

#[derive(Default)]
struct BlockText {
    blocks: Vec<String>,
    current: String,
}

impl BlockText {
    fn push_str(&mut self, text: &str) {
        self.current.push_str(text);
    }

    /// Close the running block: whitespace collapses inside each line, and
    /// explicit line breaks survive.
    fn end_block(&mut self) {
        let lines: Vec<String> = self
            .current
            .split('\n')
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect();
        self.current.clear();
        if !lines.is_empty() {
            self.blocks.push(lines.join("\n"));
        }
    }

    fn finish(mut self) -> String {
        self.end_block();
        self.blocks.join("\n\n")
    }
}

fn convert_with_pandoc(path: &Path, cache: &ConversionCache) -> Result<String> {
    convert_cached(path, cache, "pandoc", || {
        let mut command = Command::new("pandoc");
        command
            .arg(path)
            .arg("--to")
            .arg("plain")
            .arg("--wrap=none")
            .arg("--columns=100000")
            .arg("--strip-comments")
            .arg("--eol=lf");
        command
    })
}

fn convert_with_pdftotext(path: &Path, cache: &ConversionCache) -> Result<String> {
    let text = convert_cached(path, cache, "pdftotext", || {
        let mut command = Command::new("pdftotext");
        command.arg("-enc").arg("UTF-8").arg(path).arg("-");
        command
    })?;
    // pdftotext separates pages with form feeds.
    Ok(text.replace('\u{c}', "\n\n"))
}

fn convert_cached(
    path: &Path,
    cache: &ConversionCache,
    tool: &str,
    build: impl FnOnce() -> Command,
) -> Result<String> {
    info!(path = %path.display(), tool, "Converting source to plain text");

    let signature = source_signature(path)?;
    if let Some(cached) = cache.read(path, tool, &signature)? {
        info!(path = %path.display(), tool, "Using cached plain-text conversion");
        return Ok(cached);
    }

    let output = build()
        .output()
        .with_context(|| format!("Failed to start {tool} for {}", path.display()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "{tool} conversion failed for {}: {}",
            path.display(),
            stderr.trim()
        );
    }

    let text = String::from_utf8(output.stdout)
        .with_context(|| format!("{tool} returned non-UTF8 text for {}", path.display()))?;

    if let Err(err) = cache.write(path, tool, &signature, &text) {
        warn!(path = %path.display(), tool, "Failed to cache converted text: {err}");
    }

    info!(
        path = %path.display(),
        tool,
        total_chars = text.len(),
        "Finished conversion"
    );
    Ok(text)
}
