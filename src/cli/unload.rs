use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use colored::Colorize;
use rayon::prelude::*;
use serde::Serialize;

use crate::cli::wprintln;
use crate::heap::catalog::{read_pg_version, Catalog};
use crate::heap::constants::MIN_SIZE_FOR_THREADING;
use crate::heap::decode::{decode_row, DecodeOptions};
use crate::heap::output::{quoted_if_upper, render_csv, render_insert, OutputFormat};
use crate::heap::page::{HeapPage, LpFlags, OpenedPage};
use crate::heap::relation::TabDescriptor;
use crate::heap::segment::SegmentSet;
use crate::heap::toast::ToastResolver;
use crate::heap::tuple::walk_attributes;
use crate::util::fs::{ensure_dir, resolve_symlink};
use crate::PguError;

pub struct UnloadOptions {
    /// Comma-separated relation names.
    pub table: String,
    pub file: Option<String>,
    pub catalog: Option<String>,
    pub datadir: Option<String>,
    pub types: Option<String>,
    pub toast: Option<String>,
    pub format: OutputFormat,
    pub decode: DecodeOptions,
    pub out: String,
    pub threads: usize,
}

struct UnloadJob {
    desc: TabDescriptor,
    heap: PathBuf,
    toast: Option<PathBuf>,
}

#[derive(Serialize)]
pub struct UnloadReport {
    pub table: String,
    pub blocks: u64,
    pub malformed_pages: u64,
    pub rows: u64,
    pub flagged_rows: u64,
    pub rejected_items: u64,
    pub out_path: PathBuf,
}

fn build_jobs(opts: &UnloadOptions) -> Result<Vec<UnloadJob>, PguError> {
    let names: Vec<&str> = opts.table.split(',').map(|s| s.trim()).collect();

    if let Some(types) = &opts.types {
        if names.len() != 1 {
            return Err(PguError::Argument(
                "--types describes exactly one table".to_string(),
            ));
        }
        let file = opts.file.as_ref().ok_or_else(|| {
            PguError::Argument("--types requires --file for the heap data".to_string())
        })?;
        let type_list: Vec<&str> = types.split(',').collect();
        return Ok(vec![UnloadJob {
            desc: TabDescriptor::from_types(names[0], &type_list)?,
            heap: PathBuf::from(file),
            toast: opts.toast.as_ref().map(PathBuf::from),
        }]);
    }

    let catalog_dir = opts.catalog.as_ref().ok_or_else(|| {
        PguError::Argument("either --catalog or --types must be given".to_string())
    })?;
    let catalog = Catalog::load(std::path::Path::new(catalog_dir))?;

    // A tablespace datadir is a symlink under pg_tblspc; resolve it once.
    let datadir: Option<PathBuf> = opts
        .datadir
        .as_ref()
        .map(|d| resolve_symlink(std::path::Path::new(d)));

    // Database directories carry their own PG_VERSION copy; an
    // unsupported or mismatched cluster fails before any file is touched.
    if let Some(dd) = &datadir {
        if dd.join("PG_VERSION").is_file() {
            read_pg_version(dd)?;
        }
    }

    let mut jobs = Vec::with_capacity(names.len());
    for name in names {
        let entry = catalog
            .find_table(name)
            .ok_or_else(|| PguError::Argument(format!("relation '{}' not in catalog", name)))?;
        let desc = entry.descriptor()?;

        let heap = match (&opts.file, jobs.is_empty()) {
            (Some(f), true) if opts.table.split(',').count() == 1 => PathBuf::from(f),
            _ => {
                let dd = datadir.as_ref().ok_or_else(|| {
                    PguError::Argument("--datadir required to locate relation files".to_string())
                })?;
                entry.heap_path(dd)
            }
        };
        let toast = match &opts.toast {
            Some(t) => Some(PathBuf::from(t)),
            None => datadir
                .as_ref()
                .and_then(|dd| entry.toast_path(dd))
                .filter(|p| p.is_file()),
        };
        jobs.push(UnloadJob { desc, heap, toast });
    }
    Ok(jobs)
}

fn unload_one(
    job: &UnloadJob,
    format: OutputFormat,
    decode_opts: &DecodeOptions,
    out_dir: &std::path::Path,
) -> Result<UnloadReport, PguError> {
    let mut seg = SegmentSet::open(&job.heap)?;
    let mut resolver = match &job.toast {
        Some(path) => ToastResolver::new(SegmentSet::open(path)?),
        None => ToastResolver::unavailable(),
    };

    let ext = match format {
        OutputFormat::Insert => "sql",
        OutputFormat::Csv => "csv",
    };
    let out_path = out_dir.join(format!("{}.{}", job.desc.name, ext));
    let mut out = File::create(&out_path)
        .map_err(|e| PguError::Io(format!("Cannot create {}: {}", out_path.display(), e)))?;

    let mut report = UnloadReport {
        table: job.desc.name.clone(),
        blocks: 0,
        malformed_pages: 0,
        rows: 0,
        flagged_rows: 0,
        rejected_items: 0,
        out_path: out_path.clone(),
    };

    let desc = &job.desc;
    seg.for_each_block(|_, data| {
        report.blocks += 1;
        let page = match HeapPage::open(data) {
            Ok(OpenedPage::Heap(p)) => p,
            Ok(OpenedPage::NewEmpty) => return Ok(()),
            Err(_) => {
                report.malformed_pages += 1;
                return Ok(());
            }
        };

        // Rows come out in (block ascending, slot ascending) order.
        for (_, lp) in page.items() {
            if lp.flags() != LpFlags::Normal {
                continue;
            }
            let item = match page.item_bytes(&lp) {
                Ok(i) => i,
                Err(_) => {
                    report.rejected_items += 1;
                    continue;
                }
            };
            let walked = match walk_attributes(item, desc) {
                Ok(w) => w,
                Err(_) => {
                    report.rejected_items += 1;
                    continue;
                }
            };
            let row = decode_row(desc, &walked, Some(&mut resolver), decode_opts);
            if row.flagged {
                report.flagged_rows += 1;
            }
            let line = match format {
                OutputFormat::Insert => render_insert(&desc.name, &row),
                OutputFormat::Csv => render_csv(&row),
            };
            writeln!(out, "{}", line)
                .map_err(|e| PguError::Io(format!("Cannot write {}: {}", out_path.display(), e)))?;
            report.rows += 1;
        }
        Ok(())
    })?;

    Ok(report)
}

pub fn execute(opts: &UnloadOptions, writer: &mut dyn Write) -> Result<(), PguError> {
    let jobs = build_jobs(opts)?;
    let out_dir = PathBuf::from(&opts.out);
    ensure_dir(&out_dir)?;

    let total_bytes: u64 = jobs
        .iter()
        .filter_map(|j| std::fs::metadata(&j.heap).ok())
        .map(|m| m.len())
        .sum();

    // Independent relations may unload in parallel; each worker owns its
    // own resolver cache and output file.
    let parallel = jobs.len() > 1 && total_bytes > MIN_SIZE_FOR_THREADING && opts.threads != 1;

    let results: Vec<Result<UnloadReport, PguError>> = if parallel {
        jobs.par_iter()
            .map(|job| unload_one(job, opts.format, &opts.decode, &out_dir))
            .collect()
    } else {
        jobs.iter()
            .map(|job| unload_one(job, opts.format, &opts.decode, &out_dir))
            .collect()
    };

    let mut reports = Vec::with_capacity(results.len());
    for result in results {
        reports.push(result?);
    }

    if opts.format == OutputFormat::Csv {
        let manifest = out_dir.join("COPY.sql");
        let mut f = File::create(&manifest)
            .map_err(|e| PguError::Io(format!("Cannot create {}: {}", manifest.display(), e)))?;
        for report in &reports {
            let path = std::fs::canonicalize(&report.out_path)
                .unwrap_or_else(|_| report.out_path.clone());
            writeln!(
                f,
                "COPY {} FROM '{}';",
                quoted_if_upper(&report.table),
                path.display()
            )
            .map_err(|e| PguError::Io(format!("Cannot write COPY.sql: {}", e)))?;
        }
    }

    for report in &reports {
        wprintln!(
            writer,
            "{}: {} blocks, {} rows ({} flagged, {} rejected) -> {}",
            report.table.bold(),
            report.blocks,
            report.rows,
            report.flagged_rows,
            report.rejected_items,
            report.out_path.display()
        )?;
        if report.malformed_pages > 0 {
            wprintln!(
                writer,
                "  {} malformed pages skipped",
                report.malformed_pages.to_string().yellow()
            )?;
        }
    }
    Ok(())
}
