use std::io::Write;
use std::path::Path;

use colored::Colorize;

use crate::cli::wprintln;
use crate::heap::catalog::system_catalog_descriptor;
use crate::heap::decode::DecodeOptions;
use crate::heap::dropscan::DropScanEngine;
use crate::heap::output::SessionEncoding;
use crate::heap::relation::{parse_tab_config, TabDescriptor};
use crate::heap::segment::SegmentSet;
use crate::heap::toast::ToastResolver;
use crate::PguError;

pub struct DropscanOptions {
    pub file: String,
    pub table: String,
    pub types: Option<String>,
    pub config: Option<String>,
    pub pg_version: Option<u32>,
    pub toast: Option<String>,
    pub toast_index: Option<String>,
    pub encoding: SessionEncoding,
    pub out: String,
    pub json: bool,
}

fn candidate_descriptor(opts: &DropscanOptions) -> Result<TabDescriptor, PguError> {
    if let Some(types) = &opts.types {
        let type_list: Vec<&str> = types.split(',').collect();
        return TabDescriptor::from_types(&opts.table, &type_list);
    }
    if let Some(config) = &opts.config {
        let descs = parse_tab_config(Path::new(config))?;
        return descs
            .into_iter()
            .find(|d| d.name == opts.table)
            .ok_or_else(|| {
                PguError::Argument(format!("table '{}' not in {}", opts.table, config))
            });
    }
    if let Some(version) = opts.pg_version {
        return system_catalog_descriptor(version, &opts.table).unwrap_or_else(|| {
            Err(PguError::Argument(format!(
                "'{}' is not a system catalog; name its column types with --types",
                opts.table
            )))
        });
    }
    Err(PguError::Argument(
        "either --types, --config or --pg-version must describe the candidate columns".to_string(),
    ))
}

pub fn execute(opts: &DropscanOptions, writer: &mut dyn Write) -> Result<(), PguError> {
    let desc = candidate_descriptor(opts)?;

    let resolver = match &opts.toast {
        Some(toast) => {
            let segments = SegmentSet::open(toast)?;
            match &opts.toast_index {
                Some(idx) => ToastResolver::with_index_file(segments, Path::new(idx))?,
                None => ToastResolver::new(segments),
            }
        }
        None => ToastResolver::unavailable(),
    };

    let mut engine = DropScanEngine::new(
        desc,
        resolver,
        Path::new(&opts.out),
        DecodeOptions {
            encoding: opts.encoding,
            ..DecodeOptions::default()
        },
    )?;

    let mut segments = SegmentSet::open(&opts.file)?;
    let summary = engine.run(&mut segments)?;

    let idx_path = engine.save_toast_index()?;

    if opts.json {
        let rendered = serde_json::to_string_pretty(&summary)
            .map_err(|e| PguError::Parse(format!("JSON encoding failed: {}", e)))?;
        wprintln!(writer, "{}", rendered)?;
        return Ok(());
    }

    wprintln!(writer, "{}", "Scan completed, file directory as follows:".green())?;
    wprintln!(writer, "\t{}", engine.table_dir().display())?;
    for csv in &summary.csv_files {
        wprintln!(writer, "\t{}", csv.display())?;
    }
    if let Some(idx) = idx_path {
        wprintln!(writer, "\t{}", idx.display())?;
    }
    wprintln!(writer)?;
    wprintln!(writer, "Blocks scanned: {}", summary.blocks_scanned)?;
    wprintln!(
        writer,
        "Rows matched: {} ({} duplicates suppressed)",
        summary.items_matched,
        summary.items_duplicated
    )?;
    wprintln!(
        writer,
        "Rows rejected: {} ({} kept for review in Error.csv)",
        summary.items_rejected + summary.items_callback,
        summary.items_callback
    )?;
    if summary.gibberish_items > 0 {
        wprintln!(
            writer,
            "Gibberish rows: {} ({}%)",
            summary.gibberish_items.to_string().yellow(),
            summary.gibberish_percent()
        )?;
    }
    Ok(())
}
