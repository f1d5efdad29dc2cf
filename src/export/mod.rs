use anyhow::Result;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::db::{AssociationStore, TagCatalog};
use crate::search::{EntityKind, SearchEngine, TagPredicate};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        [ExportFormat::Json, ExportFormat::Csv]
            .into_iter()
            .find(|format| format.extension() == ext)
    }
}

/// Export every match of `predicates` (no paging) to a file
pub fn export_results<S>(
    engine: &SearchEngine<'_, S>,
    predicates: &[TagPredicate],
    kind: EntityKind,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize>
where
    S: TagCatalog + AssociationStore,
{
    match kind {
        EntityKind::Image => {
            let rows = engine.search_images(predicates, 0, 0)?.items;
            write_rows(&rows, output_path, format)?;
            Ok(rows.len())
        }
        EntityKind::Collection => {
            let rows = engine.search_collections(predicates, 0, 0)?.items;
            write_rows(&rows, output_path, format)?;
            Ok(rows.len())
        }
    }
}

fn write_rows<T: Serialize>(rows: &[T], output_path: &Path, format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::Json => export_json(rows, output_path),
        ExportFormat::Csv => export_csv(rows, output_path),
    }
}

fn export_json<T: Serialize>(rows: &[T], output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(rows)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv<T: Serialize>(rows: &[T], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;
    // Headers come from the field names of the first row
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
