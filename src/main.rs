//! Entry point for the read-repeat console reader.
//!
//! Responsibilities here are intentionally minimal:
//! - Parse command-line arguments.
//! - Load user configuration from `conf/config.toml`.
//! - Open the document library under the configured data dir.
//! - Dispatch to import, library, flag, reading or report commands.

mod console_speech;

use crate::console_speech::ConsoleSpeech;
use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use read_repeat_core::cache::ConversionCache;
use read_repeat_core::config::{AppConfig, LogLevel, load_config};
use read_repeat_core::document::{DocumentId, Flag, FlagId, parse_hex_color};
use read_repeat_core::import::import_batch;
use read_repeat_core::playback::{PlayOutcome, PlaybackState};
use read_repeat_core::report::{ReportKind, reading_progress, write_report};
use read_repeat_core::session::ReaderSession;
use read_repeat_core::speech::{self, SpeechService};
use read_repeat_core::store::{DocumentStore, LibraryStore};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const USAGE: &str = "\
Usage: read-repeat <command>
  import [--flag NAME] <file>...   import txt/md/docx/epub/pdf files
  list                             list stored documents
  flags                            list flags
  flag <name> [#RRGGBB]            create a flag
  flag-edit <id> [--name N] [--color C]
                                   rename or recolor a flag
  flag-delete <id>                 delete a flag and untag its documents
  tag <doc-id> <flag-id>           set a document's flag
  untag <doc-id>                   clear a document's flag
  delete <id>                      delete a document
  voices [query]                   list available voices
  read <id> [--page N] [--voice ID] [--repeat]
                                   read a document aloud (Ctrl+C pauses)
  report <csv|txt> [dir]           write a library report";

const DEFAULT_FLAG_COLOR: &str = "#FF4A90D9";

#[derive(Debug, PartialEq)]
enum Command {
    Import { flag: Option<String>, paths: Vec<PathBuf> },
    List,
    Flags,
    CreateFlag { name: String, color: String },
    EditFlag {
        id: FlagId,
        name: Option<String>,
        color: Option<String>,
    },
    DeleteFlag(FlagId),
    Tag { document: DocumentId, flag: FlagId },
    Untag(DocumentId),
    Delete(DocumentId),
    Voices(Option<String>),
    Read(ReadArgs),
    Report { kind: ReportKind, dir: PathBuf },
}

#[derive(Debug, Default, PartialEq)]
struct ReadArgs {
    id: u64,
    page: Option<usize>,
    voice: Option<String>,
    repeat: bool,
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let command = parse_args(env::args().skip(1))?;
    let config = load_config(Path::new("conf/config.toml"));
    match config_log_level(env::var_os("RUST_LOG").is_some(), config.log_level) {
        Some(level) => set_log_level(reload_handle, level),
        None => info!("RUST_LOG is set; keeping it over config.log_level"),
    }
    info!(
        level = %config.log_level,
        data_dir = %config.data_dir,
        "Starting read-repeat"
    );

    let store = Arc::new(LibraryStore::open(&config.data_dir())?);
    info!(path = %store.path().display(), "Library opened");

    match command {
        Command::Import { flag, paths } => import(store.as_ref(), flag.as_deref(), &paths),
        Command::List => list(store.as_ref()),
        Command::Flags => list_flags(store.as_ref()),
        Command::CreateFlag { name, color } => {
            let mut flag = Flag::new(&name, checked_color(color)?)?;
            let id = store.save_flag(&mut flag)?;
            println!("Created flag {id} {}", flag.name);
            Ok(())
        }
        Command::EditFlag { id, name, color } => {
            let flag = edit_flag(store.as_ref(), id, name.as_deref(), color)?;
            println!("Updated flag {id} {} {}", flag.name, flag.color);
            Ok(())
        }
        Command::DeleteFlag(id) => {
            if store.delete_flag(id)? {
                println!("Deleted flag {id}");
            } else {
                println!("No flag with id {id}");
            }
            Ok(())
        }
        Command::Tag { document, flag } => {
            store.set_document_flag(document, Some(flag))?;
            println!("Tagged document {document} with flag {flag}");
            Ok(())
        }
        Command::Untag(document) => {
            store.set_document_flag(document, None)?;
            println!("Cleared the flag of document {document}");
            Ok(())
        }
        Command::Delete(id) => {
            if store.delete_document(id)? {
                println!("Deleted document {id}");
            } else {
                println!("No document with id {id}");
            }
            Ok(())
        }
        Command::Voices(query) => {
            let runtime = build_runtime()?;
            let console = ConsoleSpeech::new(config.speech_rate_wpm);
            let voices = runtime
                .block_on(console.list_voices())
                .map_err(|err| anyhow!("Failed to list voices: {err}"))?;
            let voices = speech::filter_voices(&voices, query.as_deref().unwrap_or(""));
            for voice in voices {
                println!("{:<16} {}", voice.id, voice.label());
            }
            Ok(())
        }
        Command::Read(args) => {
            let runtime = build_runtime()?;
            runtime.block_on(read(store, &config, args))
        }
        Command::Report { kind, dir } => {
            let path = write_report(store.as_ref(), &dir, kind, Utc::now())?;
            println!("Report written to {}", path.display());
            Ok(())
        }
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")
}

fn import(store: &LibraryStore, flag: Option<&str>, paths: &[PathBuf]) -> Result<()> {
    let flag = flag.map(|name| find_or_create_flag(store, name)).transpose()?;
    let cache = ConversionCache::default();
    let report = import_batch(store, paths, flag, &cache);
    for document in &report.imported {
        let id = document.id.map(|id| id.to_string()).unwrap_or_default();
        println!("Imported {id:>4}  {}", document.name);
    }
    for failure in &report.failures {
        println!("Failed       {}: {}", failure.path.display(), failure.error);
    }
    if report.imported.is_empty() && !report.failures.is_empty() {
        bail!("No documents were imported");
    }
    Ok(())
}

/// Return the log level from config unless `RUST_LOG` already chose one.
fn config_log_level(rust_log_set: bool, level: LogLevel) -> Option<&'static str> {
    (!rust_log_set).then(|| level.as_filter_str())
}

fn checked_color(color: String) -> Result<String> {
    if parse_hex_color(&color).is_none() {
        bail!("Invalid color {color:?}; expected #RRGGBB or #AARRGGBB");
    }
    Ok(color)
}

fn edit_flag(
    store: &LibraryStore,
    id: FlagId,
    name: Option<&str>,
    color: Option<String>,
) -> Result<Flag> {
    let mut flag = store
        .get_flag(id)?
        .with_context(|| format!("No flag with id {id}"))?;
    if let Some(name) = name {
        flag.name = Flag::new(name, flag.color.clone())?.name;
    }
    if let Some(color) = color {
        flag.color = checked_color(color)?;
    }
    store.save_flag(&mut flag)?;
    Ok(flag)
}

fn find_or_create_flag(store: &LibraryStore, name: &str) -> Result<FlagId> {
    let wanted = name.trim();
    if let Some(id) = store
        .list_flags()?
        .into_iter()
        .find(|flag| flag.name.eq_ignore_ascii_case(wanted))
        .and_then(|flag| flag.id)
    {
        return Ok(id);
    }
    let mut flag = Flag::new(wanted, DEFAULT_FLAG_COLOR)?;
    let id = store.save_flag(&mut flag)?;
    info!(%id, name = %flag.name, "Created flag for import");
    Ok(id)
}

fn list(store: &LibraryStore) -> Result<()> {
    let flags = store.list_flags()?;
    let mut documents = store.list_documents()?;
    documents.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    if documents.is_empty() {
        println!("Library is empty");
        return Ok(());
    }
    for document in documents {
        let id = document.id.map(|id| id.to_string()).unwrap_or_default();
        let flag = document
            .flag_id
            .and_then(|flag_id| flags.iter().find(|flag| flag.id == Some(flag_id)))
            .map(|flag| flag.name.as_str())
            .unwrap_or("-");
        println!(
            "{id:>4}  {:<40} {:>6.1}%  {flag}",
            document.name,
            reading_progress(&document)
        );
    }
    Ok(())
}

fn list_flags(store: &LibraryStore) -> Result<()> {
    for flag in store.list_flags()? {
        let id = flag.id.map(|id| id.to_string()).unwrap_or_default();
        println!("{id:>4}  {:<24} {}", flag.name, flag.color);
    }
    Ok(())
}

async fn read(store: Arc<LibraryStore>, config: &AppConfig, args: ReadArgs) -> Result<()> {
    let speech = Arc::new(ConsoleSpeech::new(config.speech_rate_wpm));
    let mut session =
        ReaderSession::open(store, speech, DocumentId(args.id), config).await?;

    if let Some(voice) = args.voice.as_deref() {
        session.select_voice(voice)?;
    } else if session.controller().voice().is_none() {
        let first = session
            .voices()
            .first()
            .map(|voice| voice.id.clone())
            .ok_or_else(|| anyhow!("No voices available"))?;
        let voice = session.select_voice(&first)?;
        warn!(voice = %voice.id, "No voice chosen for this document; using the first one");
    }
    if let Some(page) = args.page {
        session.jump_to_page(page)?;
    }
    if args.repeat {
        session.toggle_repeat();
    }

    let controller = session.controller().clone();
    ctrlc::set_handler(move || {
        if !controller.pause() {
            controller.stop();
        }
    })
    .context("Failed to install Ctrl+C handler")?;

    let mut snapshots = session.controller().subscribe();
    let total_pages = snapshots.borrow().page_count;
    let progress = tokio::spawn(async move {
        let mut shown = None;
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.state == PlaybackState::Playing && shown != Some(snapshot.cursor.page) {
                shown = Some(snapshot.cursor.page);
                println!("-- page {}/{} --", snapshot.cursor.page + 1, total_pages);
            }
        }
    });

    let view = session.view();
    println!(
        "Reading \"{}\" with {}",
        view.document_name,
        view.voice.as_ref().map(|voice| voice.label()).unwrap_or_default()
    );
    let outcome = session.play().await;
    progress.abort();

    match outcome {
        Ok(PlayOutcome::Completed) => println!("Finished."),
        Ok(PlayOutcome::Cancelled) => {
            let snapshot = session.controller().snapshot();
            if snapshot.state == PlaybackState::Paused {
                println!(
                    "Paused on page {}, phrase {}.",
                    snapshot.cursor.page + 1,
                    snapshot.cursor.phrase + 1
                );
            } else {
                println!("Stopped.");
            }
        }
        Err(err) => {
            session.close().await;
            return Err(err).context("Playback failed");
        }
    }
    session.close().await;
    Ok(())
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Command> {
    let mut args = args;
    let command = args.next().ok_or_else(|| anyhow!(USAGE))?;
    let parsed = match command.as_str() {
        "import" => {
            let mut flag = None;
            let mut paths = Vec::new();
            while let Some(arg) = args.next() {
                if arg == "--flag" {
                    flag = Some(args.next().ok_or_else(|| anyhow!("--flag needs a name"))?);
                } else {
                    paths.push(PathBuf::from(arg));
                }
            }
            if paths.is_empty() {
                bail!("import needs at least one file\n{USAGE}");
            }
            Command::Import { flag, paths }
        }
        "list" => Command::List,
        "flags" => Command::Flags,
        "flag" => {
            let name = args.next().ok_or_else(|| anyhow!("flag needs a name\n{USAGE}"))?;
            let color = args.next().unwrap_or_else(|| DEFAULT_FLAG_COLOR.to_string());
            Command::CreateFlag { name, color }
        }
        "flag-edit" => {
            let id = FlagId(parse_number(args.next(), "flag id")?);
            let mut name = None;
            let mut color = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--name" => {
                        name = Some(args.next().ok_or_else(|| anyhow!("--name needs a value"))?)
                    }
                    "--color" => {
                        color = Some(args.next().ok_or_else(|| anyhow!("--color needs a value"))?)
                    }
                    other => bail!("Unknown flag-edit option {other:?}\n{USAGE}"),
                }
            }
            if name.is_none() && color.is_none() {
                bail!("flag-edit needs --name or --color\n{USAGE}");
            }
            Command::EditFlag { id, name, color }
        }
        "flag-delete" => Command::DeleteFlag(FlagId(parse_number(args.next(), "flag id")?)),
        "tag" => {
            let document = DocumentId(parse_number(args.next(), "document id")?);
            let flag = FlagId(parse_number(args.next(), "flag id")?);
            Command::Tag { document, flag }
        }
        "untag" => Command::Untag(DocumentId(parse_number(args.next(), "document id")?)),
        "delete" => {
            let id = parse_number(args.next(), "document id")?;
            Command::Delete(DocumentId(id))
        }
        "voices" => Command::Voices(args.next()),
        "read" => {
            let mut read = ReadArgs {
                id: parse_number(args.next(), "document id")?,
                ..ReadArgs::default()
            };
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--page" => read.page = Some(parse_number(args.next(), "page")? as usize),
                    "--voice" => {
                        read.voice =
                            Some(args.next().ok_or_else(|| anyhow!("--voice needs an id"))?)
                    }
                    "--repeat" => read.repeat = true,
                    other => bail!("Unknown read option {other:?}\n{USAGE}"),
                }
            }
            Command::Read(read)
        }
        "report" => {
            let kind: ReportKind = args
                .next()
                .ok_or_else(|| anyhow!("report needs a format (csv or txt)"))?
                .parse()?;
            let dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
            Command::Report { kind, dir }
        }
        "-h" | "--help" | "help" => bail!(USAGE),
        other => bail!("Unknown command {other:?}\n{USAGE}"),
    };
    if let Some(extra) = args.next() {
        bail!("Unexpected argument {extra:?}\n{USAGE}");
    }
    Ok(parsed)
}

fn parse_number(arg: Option<String>, what: &str) -> Result<u64> {
    let raw = arg.ok_or_else(|| anyhow!("Missing {what}\n{USAGE}"))?;
    raw.parse()
        .with_context(|| format!("Invalid {what}: {raw:?}"))
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    warn!("Logging initialized; override level with config.log_level or RUST_LOG");
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}
