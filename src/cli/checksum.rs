use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::{create_progress_bar, wprintln};
use crate::heap::checksum::verify_page;
use crate::heap::segment::SegmentSet;
use crate::PguError;

pub struct ChecksumOptions {
    pub file: String,
    pub verbose: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct ChecksumReport {
    total: u64,
    empty: u64,
    disabled: u64,
    valid: u64,
    invalid: u64,
    invalid_blocks: Vec<u64>,
}

pub fn execute(opts: &ChecksumOptions, writer: &mut dyn Write) -> Result<(), PguError> {
    let mut seg = SegmentSet::open(&opts.file)?;
    let total = seg.block_count();

    let pb = if opts.json {
        None
    } else {
        Some(create_progress_bar(total, "blocks"))
    };

    let mut report = ChecksumReport {
        total,
        empty: 0,
        disabled: 0,
        valid: 0,
        invalid: 0,
        invalid_blocks: Vec::new(),
    };
    let mut detail_lines: Vec<String> = Vec::new();

    seg.for_each_block(|blkno, data| {
        if let Some(pb) = &pb {
            pb.inc(1);
        }
        if data.iter().all(|&b| b == 0) {
            report.empty += 1;
            return Ok(());
        }
        let result = verify_page(data, blkno as u32);
        if result.disabled {
            report.disabled += 1;
        } else if result.valid {
            report.valid += 1;
            if opts.verbose {
                detail_lines.push(format!("Block {}: ok (0x{:04X})", blkno, result.stored));
            }
        } else {
            report.invalid += 1;
            report.invalid_blocks.push(blkno);
            detail_lines.push(format!(
                "Block {}: stored 0x{:04X}, calculated 0x{:04X}",
                blkno, result.stored, result.calculated
            ));
        }
        Ok(())
    })?;

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    if opts.json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| PguError::Parse(format!("JSON encoding failed: {}", e)))?;
        wprintln!(writer, "{}", rendered)?;
    } else {
        wprintln!(writer, "Validating checksums for {} ({} blocks)", opts.file, total)?;
        wprintln!(writer)?;
        for line in &detail_lines {
            wprintln!(writer, "{}", line)?;
        }
        if !detail_lines.is_empty() {
            wprintln!(writer)?;
        }
        wprintln!(writer, "Summary:")?;
        wprintln!(writer, "  Total blocks: {}", report.total)?;
        wprintln!(writer, "  Empty blocks: {}", report.empty)?;
        wprintln!(writer, "  Checksums disabled: {}", report.disabled)?;
        wprintln!(writer, "  Valid checksums: {}", report.valid)?;
        if report.invalid > 0 {
            wprintln!(
                writer,
                "  Invalid checksums: {}",
                report.invalid.to_string().red()
            )?;
        } else {
            wprintln!(
                writer,
                "  Invalid checksums: {}",
                report.invalid.to_string().green()
            )?;
        }
    }

    if report.invalid > 0 {
        std::process::exit(1);
    }
    Ok(())
}
