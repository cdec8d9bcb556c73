use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "pgdu")]
#[command(about = "PostgreSQL heap file analysis and data recovery toolkit")]
#[command(version)]
pub struct Cli {
    /// Control colored output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Write output to a file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<String>,

    /// Worker threads for parallel unloads (0 = one per core)
    #[arg(long, default_value = "0", global = true)]
    pub threads: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// INSERT statements
    Insert,
    /// Tab-separated values, \N for NULL
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum EncodingArg {
    Utf8,
    Gbk,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ByteaArg {
    /// \x-prefixed lowercase hex (database default)
    Hex,
    /// Legacy octal escape form
    Escape,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse heap pages and display a structure summary
    Pages {
        /// Path to a heap segment file
        #[arg(short, long)]
        file: String,

        /// Display a specific block number
        #[arg(short, long)]
        page: Option<u64>,

        /// Display line pointer details per page
        #[arg(short, long)]
        verbose: bool,

        /// Skip never-written (all-zero) pages
        #[arg(short = 'e', long = "no-empty")]
        no_empty: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Recompute and validate page checksums
    Checksum {
        /// Path to a heap segment file
        #[arg(short, long)]
        file: String,

        /// Show per-page checksum details
        #[arg(short, long)]
        verbose: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Decode every row of a relation into INSERT or CSV form
    Unload {
        /// Relation name(s), comma-separated (schema-qualified allowed)
        #[arg(short, long)]
        table: String,

        /// Path to the heap segment file (single table only)
        #[arg(short, long)]
        file: Option<String>,

        /// Directory with catalog text dumps (tables.txt et al.)
        #[arg(short, long)]
        catalog: Option<String>,

        /// Database directory holding the relation files by filenode
        #[arg(short, long)]
        datadir: Option<String>,

        /// Comma-separated column types (catalog-less single table)
        #[arg(long)]
        types: Option<String>,

        /// Path to the TOAST sibling's segment file
        #[arg(long)]
        toast: Option<String>,

        /// Output format
        #[arg(long, default_value = "csv")]
        format: FormatArg,

        /// Session encoding of the source data
        #[arg(long, default_value = "utf8")]
        encoding: EncodingArg,

        /// bytea rendering
        #[arg(long, default_value = "hex")]
        bytea: ByteaArg,

        /// Output directory
        #[arg(long, default_value = "restore/unload")]
        out: String,
    },

    /// Salvage rows from a raw file without catalog metadata
    Dropscan {
        /// Path to the raw file or image to scan
        #[arg(short, long)]
        file: String,

        /// Candidate table name
        #[arg(short, long)]
        table: String,

        /// Comma-separated candidate column types
        #[arg(long)]
        types: Option<String>,

        /// tab.config file naming tables and their type lists
        #[arg(long)]
        config: Option<String>,

        /// Cluster major version, for scanning the system catalogs
        /// themselves (pg_class, pg_attribute, ...)
        #[arg(long = "pg-version")]
        pg_version: Option<u32>,

        /// Path to the raw TOAST sibling file
        #[arg(long)]
        toast: Option<String>,

        /// Pre-built chunk index (dbf_idx) for the TOAST file
        #[arg(long = "toast-index", requires = "toast")]
        toast_index: Option<String>,

        /// Session encoding of the source data
        #[arg(long, default_value = "utf8")]
        encoding: EncodingArg,

        /// Run directory
        #[arg(long, default_value = "restore/dropscan")]
        out: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}
