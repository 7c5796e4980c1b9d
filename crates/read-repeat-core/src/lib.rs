pub mod cache;
pub mod cancellation;
pub mod config;
pub mod document;
pub mod error;
pub mod import;
pub mod pagination;
pub mod persistence;
pub mod playback;
pub mod presentation;
pub mod report;
pub mod session;
pub mod speech;
pub mod store;
pub mod text_utils;

use std::fs;
use std::path::Path;
use ts_rs::TS;

fn export_single_type<T: TS + 'static>(out_dir: &Path) -> Result<(), String> {
    T::export_all_to(out_dir).map_err(|err| err.to_string())
}

/// Write TypeScript declarations of the view types plus an `index.ts`
/// re-exporting them. Stale `.ts` files in `out_dir` are removed first.
pub fn export_ts_bindings(out_dir: &Path) -> Result<(), String> {
    fs::create_dir_all(out_dir)
        .map_err(|err| format!("Failed to create {}: {err}", out_dir.display()))?;

    for entry in fs::read_dir(out_dir)
        .map_err(|err| format!("Failed to list {}: {err}", out_dir.display()))?
    {
        let entry = entry.map_err(|err| format!("Failed to read entry: {err}"))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("ts") {
            fs::remove_file(&path)
                .map_err(|err| format!("Failed to remove {}: {err}", path.display()))?;
        }
    }

    export_single_type::<config::ThemeMode>(out_dir)?;
    export_single_type::<config::HighlightColor>(out_dir)?;
    export_single_type::<document::DocumentId>(out_dir)?;
    export_single_type::<document::FlagId>(out_dir)?;
    export_single_type::<speech::Locale>(out_dir)?;
    export_single_type::<playback::PlaybackState>(out_dir)?;
    export_single_type::<playback::Cursor>(out_dir)?;
    export_single_type::<playback::MarkKind>(out_dir)?;
    export_single_type::<playback::HighlightMark>(out_dir)?;
    export_single_type::<playback::PlaybackSnapshot>(out_dir)?;
    export_single_type::<presentation::Rgba>(out_dir)?;
    export_single_type::<presentation::PhraseTone>(out_dir)?;
    export_single_type::<presentation::PhraseStyle>(out_dir)?;
    export_single_type::<session::PhraseView>(out_dir)?;
    export_single_type::<session::ReaderView>(out_dir)?;

    let index_content = r#"export type { ThemeMode } from "./ThemeMode";
export type { HighlightColor } from "./HighlightColor";
export type { DocumentId } from "./DocumentId";
export type { FlagId } from "./FlagId";
export type { Locale } from "./Locale";
export type { PlaybackState } from "./PlaybackState";
export type { Cursor } from "./Cursor";
export type { MarkKind } from "./MarkKind";
export type { HighlightMark } from "./HighlightMark";
export type { PlaybackSnapshot } from "./PlaybackSnapshot";
export type { Rgba } from "./Rgba";
export type { PhraseTone } from "./PhraseTone";
export type { PhraseStyle } from "./PhraseStyle";
export type { PhraseView } from "./PhraseView";
export type { ReaderView } from "./ReaderView";
"#;

    fs::write(out_dir.join("index.ts"), index_content).map_err(|err| {
        format!(
            "Failed to write {}: {err}",
            out_dir.join("index.ts").display()
        )
    })?;

    Ok(())
}
