use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::wprintln;
use crate::heap::constants::BLCKSZ;
use crate::heap::page::{HeapPage, LpFlags, OpenedPage};
use crate::heap::segment::SegmentSet;
use crate::util::hex::format_offset;
use crate::PguError;

pub struct PagesOptions {
    pub file: String,
    pub page: Option<u64>,
    pub verbose: bool,
    pub no_empty: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct PageReport {
    block: u64,
    state: &'static str,
    lsn: Option<u64>,
    checksum: Option<u16>,
    lower: Option<u16>,
    upper: Option<u16>,
    special: Option<u16>,
    page_size: Option<usize>,
    layout_version: Option<u8>,
    line_pointers: usize,
    normal: usize,
    redirect: usize,
    dead: usize,
    unused: usize,
}

fn report_for(blkno: u64, data: &[u8]) -> PageReport {
    match HeapPage::open(data) {
        Ok(OpenedPage::Heap(page)) => {
            let mut normal = 0;
            let mut redirect = 0;
            let mut dead = 0;
            let mut unused = 0;
            for slot in 1..=page.line_pointer_count() {
                match page.line_pointer(slot).map(|lp| lp.flags()) {
                    Some(LpFlags::Normal) => normal += 1,
                    Some(LpFlags::Redirect) => redirect += 1,
                    Some(LpFlags::Dead) => dead += 1,
                    _ => unused += 1,
                }
            }
            PageReport {
                block: blkno,
                state: "heap",
                lsn: Some(page.header.lsn),
                checksum: Some(page.header.checksum),
                lower: Some(page.header.lower),
                upper: Some(page.header.upper),
                special: Some(page.header.special),
                page_size: Some(page.header.page_size()),
                layout_version: Some(page.header.layout_version()),
                line_pointers: page.line_pointer_count(),
                normal,
                redirect,
                dead,
                unused,
            }
        }
        Ok(OpenedPage::NewEmpty) => PageReport {
            block: blkno,
            state: "new",
            lsn: None,
            checksum: None,
            lower: None,
            upper: None,
            special: None,
            page_size: None,
            layout_version: None,
            line_pointers: 0,
            normal: 0,
            redirect: 0,
            dead: 0,
            unused: 0,
        },
        Err(_) => PageReport {
            block: blkno,
            state: "malformed",
            lsn: None,
            checksum: None,
            lower: None,
            upper: None,
            special: None,
            page_size: None,
            layout_version: None,
            line_pointers: 0,
            normal: 0,
            redirect: 0,
            dead: 0,
            unused: 0,
        },
    }
}

pub fn execute(opts: &PagesOptions, writer: &mut dyn Write) -> Result<(), PguError> {
    let mut seg = SegmentSet::open(&opts.file)?;
    let mut reports = Vec::new();

    match opts.page {
        Some(blkno) => {
            let data = seg.read_block(blkno)?;
            reports.push(report_for(blkno, &data));
        }
        None => {
            seg.for_each_block(|blkno, data| {
                reports.push(report_for(blkno, data));
                Ok(())
            })?;
        }
    }

    if opts.no_empty {
        reports.retain(|r| r.state != "new");
    }

    if opts.json {
        let rendered = serde_json::to_string_pretty(&reports)
            .map_err(|e| PguError::Parse(format!("JSON encoding failed: {}", e)))?;
        wprintln!(writer, "{}", rendered)?;
        return Ok(());
    }

    wprintln!(
        writer,
        "{} ({} blocks, {} bytes)",
        opts.file,
        seg.block_count(),
        seg.byte_size()
    )?;
    wprintln!(writer)?;

    let mut heap = 0u64;
    let mut new = 0u64;
    let mut malformed = 0u64;
    for r in &reports {
        match r.state {
            "heap" => {
                heap += 1;
                wprintln!(
                    writer,
                    "Block {:>6}: lsn {:>12X}  v{}  lower {:>5}  upper {:>5}  special {:>5}  items {} ({} normal, {} redirect, {} dead)",
                    r.block,
                    r.lsn.unwrap_or(0),
                    r.layout_version.unwrap_or(0),
                    r.lower.unwrap_or(0),
                    r.upper.unwrap_or(0),
                    r.special.unwrap_or(0),
                    r.line_pointers,
                    r.normal,
                    r.redirect,
                    r.dead
                )?;
                if opts.verbose && r.page_size != Some(BLCKSZ) {
                    wprintln!(
                        writer,
                        "Block {:>6}: {} (header says {} bytes)",
                        r.block,
                        "page size mismatch".yellow(),
                        r.page_size.unwrap_or(0)
                    )?;
                }
            }
            "new" => {
                new += 1;
                if opts.verbose {
                    wprintln!(writer, "Block {:>6}: {}", r.block, "never written".dimmed())?;
                }
            }
            _ => {
                malformed += 1;
                wprintln!(
                    writer,
                    "Block {:>6} at {}: {}",
                    r.block,
                    format_offset(r.block * BLCKSZ as u64),
                    "MALFORMED".red()
                )?;
            }
        }
    }

    wprintln!(writer)?;
    wprintln!(writer, "Summary:")?;
    wprintln!(writer, "  Heap pages: {}", heap)?;
    wprintln!(writer, "  Never-written pages: {}", new)?;
    if malformed > 0 {
        wprintln!(writer, "  Malformed pages: {}", malformed.to_string().red())?;
    } else {
        wprintln!(writer, "  Malformed pages: 0")?;
    }
    Ok(())
}
