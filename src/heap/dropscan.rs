//! Catalog-less recovery scanning.
//!
//! When a table was dropped or truncated, nothing points at its pages any
//! more; all that is left is a raw file (or a disk image) and a guess at
//! the column types. The drop-scan engine probes every page with that
//! candidate descriptor and keeps what it can prove:
//!
//! - an item whose attribute walk consumes it exactly and decodes cleanly
//!   is **matched** and lands in the current CSV window;
//! - a matched row bitwise-equal to the previous one is a **duplicate**
//!   (HOT chains produce these) and is counted but not re-emitted;
//! - a walk that succeeded with degraded decoders is a **callback** row,
//!   kept in `Error.csv` for manual review;
//! - everything else is rejected.
//!
//! Windows follow the file's structure: the first match opens a CSV named
//! after its byte offset, and 20 consecutive pages without a match close
//! it. On close the file is renamed to carry its statistics (and a
//! `NN%BAD_` prefix when gibberish rows were present), so a run directory
//! reads like a map of where intact data was found. A `COPY.sql` manifest
//! and a `dbf_fsm` page index round off the run.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::heap::constants::*;
use crate::heap::decode::{decode_row, DecodeOptions};
use crate::heap::output::{has_gibberish, render_csv};
use crate::heap::page::{HeapPage, LpFlags, OpenedPage};
use crate::heap::relation::TabDescriptor;
use crate::heap::segment::SegmentSet;
use crate::heap::toast::ToastResolver;
use crate::heap::tuple::walk_attributes;
use crate::util::fs::{clean_dir, ensure_dir};
use crate::PguError;

/// How one item classified during the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemClass {
    Matched,
    Duplicated,
    Callback,
    NoCallback,
}

/// Aggregate counters for one drop-scan run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DropScanSummary {
    pub blocks_scanned: u64,
    pub pages_matched: u64,
    pub items_matched: u64,
    pub items_duplicated: u64,
    pub items_callback: u64,
    pub items_rejected: u64,
    pub gibberish_items: u64,
    pub csv_files: Vec<PathBuf>,
}

impl DropScanSummary {
    /// Percentage of matched rows the gibberish filter flagged.
    pub fn gibberish_percent(&self) -> u64 {
        if self.items_matched == 0 {
            0
        } else {
            self.gibberish_items * 100 / self.items_matched
        }
    }
}

/// An open CSV window over a hot run of pages.
struct Window {
    start_offset: u64,
    path: PathBuf,
    file: File,
    items: u64,
    blocks: u64,
    gibberish: u64,
}

/// The drop-scan engine for one table candidate.
pub struct DropScanEngine {
    desc: TabDescriptor,
    resolver: ToastResolver,
    table_dir: PathBuf,
    decode_opts: DecodeOptions,
    window: Option<Window>,
    consecutive_unmatched: u32,
    last_matched: Option<String>,
    error_file: Option<File>,
    fsm: Vec<(u64, u64)>,
    summary: DropScanSummary,
}

impl DropScanEngine {
    /// Prepare a fresh run directory under `out_root/<table>`.
    ///
    /// Recorded outputs are append-only within a run; starting a new run
    /// clears the directory.
    pub fn new(
        desc: TabDescriptor,
        resolver: ToastResolver,
        out_root: &Path,
        decode_opts: DecodeOptions,
    ) -> Result<Self, PguError> {
        let table_dir = out_root.join(&desc.name);
        clean_dir(&table_dir)?;
        ensure_dir(&table_dir.join(".toast"))?;

        Ok(DropScanEngine {
            desc,
            resolver,
            table_dir,
            decode_opts,
            window: None,
            consecutive_unmatched: 0,
            last_matched: None,
            error_file: None,
            fsm: Vec::new(),
            summary: DropScanSummary::default(),
        })
    }

    /// The run directory artifacts are written into.
    pub fn table_dir(&self) -> &Path {
        &self.table_dir
    }

    /// Persist the resolver's chunk index as `.toast/dbf_idx` so later
    /// runs can skip the TOAST walk. No-op without TOAST data.
    pub fn save_toast_index(&mut self) -> Result<Option<PathBuf>, PguError> {
        self.resolver.build_index()?;
        if self.resolver.indexed_values() == 0 {
            return Ok(None);
        }
        let path = self.table_dir.join(".toast").join("dbf_idx");
        self.resolver.save_index_file(&path)?;
        Ok(Some(path))
    }

    /// Scan every block of `segments` and emit what matches.
    pub fn run(&mut self, segments: &mut SegmentSet) -> Result<DropScanSummary, PguError> {
        segments.for_each_block(|blkno, data| self.process_page(blkno, data))?;
        self.finalise()
    }

    /// Feed one page through the classifier and the window state machine.
    pub fn process_page(&mut self, blkno: u64, data: &[u8]) -> Result<(), PguError> {
        let page_offset = blkno * BLCKSZ as u64;
        self.summary.blocks_scanned += 1;

        let page = match HeapPage::open(data) {
            Ok(OpenedPage::Heap(p)) => p,
            // Malformed or never-written pages are full misses.
            _ => return self.page_unmatched(),
        };

        let mut page_matches = 0u64;
        let mut first_item_offset: Option<u64> = None;

        for (_, lp) in page.items() {
            if lp.flags() != LpFlags::Normal {
                continue;
            }
            let item = match page.item_bytes(&lp) {
                Ok(i) => i,
                Err(_) => {
                    self.summary.items_rejected += 1;
                    continue;
                }
            };

            let (class, line) = self.classify(item);
            match class {
                ItemClass::Matched => {
                    let line = line.expect("matched rows render");
                    let gibberish = has_gibberish(&line);
                    if self.window.is_none() {
                        self.open_window(page_offset)?;
                    }
                    let window = self.window.as_mut().expect("window just opened");
                    writeln!(window.file, "{}", line)
                        .map_err(|e| PguError::Io(format!("Cannot write CSV: {}", e)))?;
                    window.items += 1;
                    if gibberish {
                        window.gibberish += 1;
                        self.summary.gibberish_items += 1;
                    }
                    self.summary.items_matched += 1;
                    self.last_matched = Some(line);
                    page_matches += 1;
                    first_item_offset.get_or_insert(lp.offset() as u64);
                }
                ItemClass::Duplicated => {
                    self.summary.items_duplicated += 1;
                    page_matches += 1;
                }
                ItemClass::Callback => {
                    self.write_error_row(line.as_deref().unwrap_or(""))?;
                    self.summary.items_callback += 1;
                }
                ItemClass::NoCallback => {
                    self.summary.items_rejected += 1;
                }
            }
        }

        if page_matches > 0 {
            self.summary.pages_matched += 1;
            self.consecutive_unmatched = 0;
            if let Some(window) = self.window.as_mut() {
                window.blocks += 1;
            }
            self.fsm.push((page_offset, first_item_offset.unwrap_or(0)));
            Ok(())
        } else {
            self.page_unmatched()
        }
    }

    fn page_unmatched(&mut self) -> Result<(), PguError> {
        self.consecutive_unmatched += 1;
        if self.consecutive_unmatched > CONSECUTIVE_UNMATCHED_LIMIT {
            self.close_window()?;
        }
        Ok(())
    }

    /// Classify one item against the candidate descriptor.
    fn classify(&mut self, item: &[u8]) -> (ItemClass, Option<String>) {
        let walked = match walk_attributes(item, &self.desc) {
            Ok(w) => w,
            Err(_) => return (ItemClass::NoCallback, None),
        };

        let row = decode_row(
            &self.desc,
            &walked,
            Some(&mut self.resolver),
            &self.decode_opts,
        );
        let line = render_csv(&row);

        if walked.overflow_at.is_some() {
            return (ItemClass::Callback, Some(line));
        }
        if !walked.exact_fit(item.len()) {
            return (ItemClass::NoCallback, None);
        }
        if row.flagged {
            return (ItemClass::Callback, Some(line));
        }
        if self.last_matched.as_deref() == Some(line.as_str()) {
            return (ItemClass::Duplicated, Some(line));
        }
        (ItemClass::Matched, Some(line))
    }

    fn open_window(&mut self, start_offset: u64) -> Result<(), PguError> {
        let path = self.table_dir.join(format!("{}.csv", start_offset));
        let file = File::create(&path)
            .map_err(|e| PguError::Io(format!("Cannot create {}: {}", path.display(), e)))?;
        self.window = Some(Window {
            start_offset,
            path,
            file,
            items: 0,
            blocks: 0,
            gibberish: 0,
        });
        Ok(())
    }

    /// Close the current window, renaming its CSV to carry the stats.
    fn close_window(&mut self) -> Result<(), PguError> {
        let Some(window) = self.window.take() else {
            return Ok(());
        };
        self.consecutive_unmatched = 0;
        self.last_matched = None;

        if window.items == 0 {
            let _ = std::fs::remove_file(&window.path);
            return Ok(());
        }

        let bad_pct = window.gibberish * 100 / window.items;
        let stamp = chrono::Local::now().format("%m-%d-%H:%M:%S");
        let new_name = if bad_pct > 0 {
            format!(
                "{}%BAD_{}_{}_{}blks_{}items.csv",
                bad_pct, stamp, window.start_offset, window.blocks, window.items
            )
        } else {
            format!(
                "{}_{}_{}blks_{}items.csv",
                stamp, window.start_offset, window.blocks, window.items
            )
        };
        let new_path = self.table_dir.join(new_name);
        std::fs::rename(&window.path, &new_path)
            .map_err(|e| PguError::Io(format!("Cannot rename {}: {}", window.path.display(), e)))?;
        self.summary.csv_files.push(new_path);
        Ok(())
    }

    fn write_error_row(&mut self, line: &str) -> Result<(), PguError> {
        if self.error_file.is_none() {
            let path = self.table_dir.join("Error.csv");
            self.error_file = Some(
                File::create(&path)
                    .map_err(|e| PguError::Io(format!("Cannot create {}: {}", path.display(), e)))?,
            );
        }
        writeln!(self.error_file.as_mut().expect("error file open"), "{}", line)
            .map_err(|e| PguError::Io(format!("Cannot write Error.csv: {}", e)))
    }

    /// Close the last window, write `dbf_fsm` and the `COPY.sql` manifest.
    pub fn finalise(&mut self) -> Result<DropScanSummary, PguError> {
        self.close_window()?;

        if !self.fsm.is_empty() {
            let path = self.table_dir.join(".toast").join("dbf_fsm");
            let mut f = File::create(&path)
                .map_err(|e| PguError::Io(format!("Cannot create {}: {}", path.display(), e)))?;
            for (page_offset, item_offset) in &self.fsm {
                writeln!(f, "{}\t{}", page_offset, item_offset)
                    .map_err(|e| PguError::Io(format!("Cannot write dbf_fsm: {}", e)))?;
            }
        }

        if !self.summary.csv_files.is_empty() {
            let manifest = self.table_dir.join("COPY.sql");
            let mut f = File::create(&manifest)
                .map_err(|e| PguError::Io(format!("Cannot create {}: {}", manifest.display(), e)))?;
            for csv in &self.summary.csv_files {
                writeln!(
                    f,
                    "COPY {} FROM '{}';",
                    self.desc.name,
                    csv.display()
                )
                .map_err(|e| PguError::Io(format!("Cannot write COPY.sql: {}", e)))?;
            }
        }

        Ok(self.summary.clone())
    }
}

/// Load a `dbf_fsm` file back into `(page_offset, first_item_offset)`
/// pairs.
pub fn load_fsm(path: &Path) -> Result<Vec<(u64, u64)>, PguError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PguError::Io(format!("Cannot read {}: {}", path.display(), e)))?;
    let mut out = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let (a, b) = line.split_once('\t').ok_or_else(|| {
            PguError::Parse(format!("{}: expected 'offset\\toffset'", path.display()))
        })?;
        out.push((
            a.parse()
                .map_err(|_| PguError::Parse(format!("{}: bad page offset", path.display())))?,
            b.parse()
                .map_err(|_| PguError::Parse(format!("{}: bad item offset", path.display())))?,
        ));
    }
    Ok(out)
}
