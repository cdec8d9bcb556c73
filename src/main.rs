#[cfg(not(feature = "cli"))]
compile_error!("The `pgdu` binary requires the `cli` feature. Build with `--features cli`.");

use clap::Parser;
use std::fs::File;
use std::io::Write;
use std::process;

use pgu::cli;
use pgu::cli::app::{ByteaArg, Cli, ColorMode, Commands, EncodingArg, FormatArg};
use pgu::heap::decode::DecodeOptions;
use pgu::heap::output::{ByteaFormat, OutputFormat, SessionEncoding};
use pgu::PguError;

fn main() {
    // Fatal-signal contract: exit code 128 + signal number.
    ctrlc::set_handler(|| {
        process::exit(128 + 2);
    })
    .ok();

    let cli = Cli::parse();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .ok(); // Ignore if already initialized
    }

    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {} // colored auto-detects tty
    }

    let writer_result: Result<Box<dyn Write>, PguError> = match &cli.output {
        Some(path) => File::create(path)
            .map(|f| Box::new(f) as Box<dyn Write>)
            .map_err(|e| PguError::Io(format!("Cannot create {}: {}", path, e))),
        None => Ok(Box::new(std::io::stdout()) as Box<dyn Write>),
    };

    let mut writer = match writer_result {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Pages {
            file,
            page,
            verbose,
            no_empty,
            json,
        } => cli::pages::execute(
            &cli::pages::PagesOptions {
                file,
                page,
                verbose,
                no_empty,
                json,
            },
            &mut writer,
        ),

        Commands::Checksum {
            file,
            verbose,
            json,
        } => cli::checksum::execute(
            &cli::checksum::ChecksumOptions {
                file,
                verbose,
                json,
            },
            &mut writer,
        ),

        Commands::Unload {
            table,
            file,
            catalog,
            datadir,
            types,
            toast,
            format,
            encoding,
            bytea,
            out,
        } => cli::unload::execute(
            &cli::unload::UnloadOptions {
                table,
                file,
                catalog,
                datadir,
                types,
                toast,
                format: match format {
                    FormatArg::Insert => OutputFormat::Insert,
                    FormatArg::Csv => OutputFormat::Csv,
                },
                decode: DecodeOptions {
                    bytea: match bytea {
                        ByteaArg::Hex => ByteaFormat::Hex,
                        ByteaArg::Escape => ByteaFormat::Escape,
                    },
                    encoding: match encoding {
                        EncodingArg::Utf8 => SessionEncoding::Utf8,
                        EncodingArg::Gbk => SessionEncoding::Gbk,
                    },
                },
                out,
                threads: cli.threads,
            },
            &mut writer,
        ),

        Commands::Dropscan {
            file,
            table,
            types,
            config,
            pg_version,
            toast,
            toast_index,
            encoding,
            out,
            json,
        } => cli::dropscan::execute(
            &cli::dropscan::DropscanOptions {
                file,
                table,
                types,
                config,
                pg_version,
                toast,
                toast_index,
                encoding: match encoding {
                    EncodingArg::Utf8 => SessionEncoding::Utf8,
                    EncodingArg::Gbk => SessionEncoding::Gbk,
                },
                out,
                json,
            },
            &mut writer,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
