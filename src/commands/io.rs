//! Import and export command handlers.

use clap::Args;
use fire_migrate::config::{MAX_CHUNK, MigrateConfig, clamp_chunk};
use fire_migrate::io::{ExportOptions, ExportService, ImportOptions, ImportService};
use fire_migrate::models::CollectionPrefix;
use fire_migrate::storage::open_store;
use fire_migrate::Result;
use std::path::PathBuf;

/// Arguments of the `import` command.
#[derive(Debug, Args)]
pub struct ImportArgs {
    /// File to import (.json, .csv, .INDEX.csv or .xlsx).
    pub file: PathBuf,

    /// Target collection paths; `/` or none imports everything in the file.
    pub collections: Vec<String>,

    /// Field holding the document ID.
    #[arg(short, long)]
    pub id: Option<String>,

    /// Key that requests a generated document ID.
    #[arg(short, long)]
    pub auto_id: Option<String>,

    /// Merge into existing documents instead of replacing them.
    #[arg(short, long)]
    pub merge: bool,

    /// Operations per committed batch (1-500).
    #[arg(short = 'k', long, value_parser = parse_chunk)]
    pub chunk: Option<usize>,

    /// Label prefix marking sub-collection fields.
    #[arg(short = 'p', long = "coll-prefix")]
    pub coll_prefix: Option<String>,

    /// Import a single workbook sheet by number (1-based), ignoring the index.
    #[arg(short, long)]
    pub sheet: Option<usize>,

    /// Delete existing documents of each target collection first.
    #[arg(short = 'T', long)]
    pub truncate: bool,

    /// Log what would be written without writing anything.
    #[arg(short, long)]
    pub dry_run: bool,

    /// Log every document.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Arguments of the `export` command.
#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Output file (.json, .csv or .xlsx).
    pub file: PathBuf,

    /// Collection paths to export; `/` or none exports every root collection.
    pub collections: Vec<String>,

    /// Skip sub-collections.
    #[arg(short, long = "no-subcolls")]
    pub no_subcolls: bool,

    /// Label prefix marking sub-collection fields.
    #[arg(short = 'p', long = "coll-prefix")]
    pub coll_prefix: Option<String>,

    /// Name of the document ID column.
    #[arg(short, long = "id-field")]
    pub id_field: Option<String>,

    /// Maximum store requests in flight.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Log every traversed document.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_chunk(s: &str) -> std::result::Result<usize, String> {
    s.trim()
        .parse::<usize>()
        .map(clamp_chunk)
        .map_err(|e| format!("chunk must be a number between 1 and {MAX_CHUNK}: {e}"))
}

/// Builds import options: config defaults, then command-line flags.
fn import_options(config: &MigrateConfig, args: &ImportArgs) -> ImportOptions {
    let mut options = ImportOptions::from(&config.import)
        .with_merge(args.merge || config.import.merge)
        .with_sheet(args.sheet)
        .with_truncate(args.truncate)
        .with_dry_run(args.dry_run)
        .with_verbose(args.verbose);
    if let Some(id) = &args.id {
        options = options.with_id_field(id.clone());
    }
    if let Some(auto_id) = &args.auto_id {
        options = options.with_auto_id(auto_id.clone());
    }
    if let Some(chunk) = args.chunk {
        options = options.with_chunk(chunk);
    }
    if let Some(prefix) = &args.coll_prefix {
        options = options.with_prefix(CollectionPrefix::new(prefix.clone()));
    }
    options
}

/// Builds export options: config defaults, then command-line flags.
fn export_options(config: &MigrateConfig, args: &ExportArgs) -> ExportOptions {
    let mut options = ExportOptions::from(&config.export)
        .with_subcollections(config.export.include_subcollections && !args.no_subcolls)
        .with_verbose(args.verbose);
    if let Some(prefix) = &args.coll_prefix {
        options = options.with_prefix(CollectionPrefix::new(prefix.clone()));
    }
    if let Some(id_field) = &args.id_field {
        options = options.with_id_field(id_field.clone());
    }
    if let Some(concurrency) = args.concurrency {
        options = options.with_concurrency(concurrency);
    }
    options
}

/// Executes the import command.
pub fn cmd_import(config: &MigrateConfig, args: ImportArgs) -> Result<()> {
    let options = import_options(config, &args);
    let store = open_store(&config.store)?;
    let service = ImportService::new(store);

    let result = service.import_from_file(&args.file, &args.collections, &options)?;

    if result.dry_run {
        println!("Dry-Run complete, nothing was written to the database.");
    } else {
        println!("Import success, {} batches committed.", result.commits);
    }
    for collection in &result.collections {
        println!("  Collection:       {collection}");
    }
    if options.truncate {
        println!("  Total deleted:    {}", result.deleted);
    }
    println!("  Total written:    {}", result.written);
    if !result.has_imports() {
        tracing::warn!(file = %args.file.display(), "No documents were imported");
    }

    Ok(())
}

/// Executes the export command.
pub fn cmd_export(config: &MigrateConfig, args: ExportArgs) -> Result<()> {
    let options = export_options(config, &args);
    let store = open_store(&config.store)?;
    let service = ExportService::new(store);

    let result = service.export_to_file(&args.file, &args.collections, &options)?;
    if !result.has_exports() {
        tracing::warn!(file = %args.file.display(), "No documents found to export");
    }

    println!("Export completed:");
    println!("  Documents:    {}", result.documents);
    println!("  Collections:  {}", result.collections.join(", "));
    println!("  Format:       {}", result.format);
    for file in &result.files {
        println!("  Output:       {}", file.display());
    }

    Ok(())
}
