//! CLI subcommand implementations for the `pgdu` binary.
//!
//! Each subcommand module follows the same pattern: an `Options` struct
//! holding the parsed arguments and a `pub fn execute(opts, writer) ->
//! Result<(), PguError>` entry point. The `writer: &mut dyn Write`
//! parameter allows output to be captured in tests or redirected to a
//! file via the global `--output` flag.
//!
//! | Command | Module | Purpose |
//! |---------|--------|---------|
//! | `pgdu pages` | [`pages`] | Parse page headers and summarize page structure |
//! | `pgdu checksum` | [`checksum`] | Recompute and compare every page checksum |
//! | `pgdu unload` | [`unload`] | Decode a relation into INSERT or CSV form |
//! | `pgdu dropscan` | [`dropscan`] | Salvage rows from a raw file without a catalog |

pub mod app;
pub mod checksum;
pub mod dropscan;
pub mod pages;
pub mod unload;

/// Write a line to the given writer, converting io::Error to PguError.
macro_rules! wprintln {
    ($w:expr) => {
        writeln!($w).map_err(|e| $crate::PguError::Io(e.to_string()))
    };
    ($w:expr, $($arg:tt)*) => {
        writeln!($w, $($arg)*).map_err(|e| $crate::PguError::Io(e.to_string()))
    };
}

pub(crate) use wprintln;

use indicatif::{ProgressBar, ProgressStyle};

/// Create a styled progress bar for iterating over blocks.
pub(crate) fn create_progress_bar(count: u64, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(count);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{eta}})",
                unit
            ))
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}
