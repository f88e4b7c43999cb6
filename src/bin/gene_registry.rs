use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use gene_registry::domain::{CrossRefDb, Organism, TaxonomyId};
use gene_registry::error::RegistryError;
use gene_registry::geneinfo::{self, GeneInfoOptions};
use gene_registry::history::{self, GeneHistoryOptions};
use gene_registry::output::{JsonOutput, OutputMode};
use gene_registry::parser::InputSource;
use gene_registry::registry::{Registry, RunSummary, XrdbOutcome};
use gene_registry::store::{JsonStore, RecordStore};
use gene_registry::uniprot::{self, UniProtOptions};
use gene_registry::wormbase::{self, WormBaseOptions};

#[derive(Parser)]
#[command(name = "gene-registry")]
#[command(about = "Reconcile NCBI, UniProt and WormBase gene annotation dumps into one registry")]
#[command(version, author)]
struct Cli {
    /// Registry snapshot file.
    #[arg(long, global = true, default_value = "gene-registry.json")]
    registry: Utf8PathBuf,

    /// Print the run summary as JSON instead of the human form.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Register an organism (organisms are otherwise never created)")]
    RegisterOrganism {
        taxonomy_id: TaxonomyId,
        name: String,
    },
    #[command(about = "Register a cross-reference database with a _REPL_ URL template")]
    RegisterXrdb { name: String, url_template: String },
    #[command(about = "Load an NCBI gene_info file for one organism")]
    LoadGeneinfo {
        file: Utf8PathBuf,
        taxonomy_id: TaxonomyId,
        #[arg(long, default_value_t = 3)]
        systematic_col: usize,
        #[arg(long, default_value_t = 2)]
        symbol_col: usize,
        /// Alias column; `-` or blank reuses the symbol column.
        #[arg(long, default_value = "4")]
        alias_col: String,
        /// Tax id used inside the file when it differs from the registry's.
        #[arg(long)]
        alt_taxonomy_id: Option<TaxonomyId>,
        /// Also store systematic ids as cross-references under this xrdb.
        #[arg(long)]
        put_systematic_in_xrdb: Option<String>,
    },
    #[command(about = "Load a pre-filtered UniProt idmapping file")]
    LoadUniprot { file: Utf8PathBuf },
    #[command(about = "Load a WormBase xrefs dump from a URL")]
    LoadWormbase {
        url: String,
        taxonomy_id: TaxonomyId,
        #[arg(long, default_value = wormbase::DEFAULT_XRDB)]
        xrdb_name: String,
    },
    #[command(about = "Load an NCBI gene_history file and mark discontinued genes obsolete")]
    LoadGeneHistory {
        file: Utf8PathBuf,
        tax_id: TaxonomyId,
        #[arg(long, default_value_t = 1)]
        tax_id_col: usize,
        #[arg(long, default_value_t = 3)]
        discontinued_id_col: usize,
        #[arg(long, default_value_t = 4)]
        discontinued_symbol_col: usize,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
enum CommandOutcome {
    OrganismRegistered { taxonomy_id: TaxonomyId, name: String },
    XrdbRegistered { name: String, outcome: String },
    Load(RunSummary),
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RegistryError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RegistryError) -> u8 {
    match error {
        RegistryError::MissingCrossRefDb(_) => 4,
        RegistryError::Configuration(_)
        | RegistryError::InvalidColumn { .. }
        | RegistryError::OrganismNotFound(_) => 2,
        RegistryError::SourceOpen { .. }
        | RegistryError::Http(_)
        | RegistryError::HttpStatus { .. }
        | RegistryError::Storage(_)
        | RegistryError::Filesystem(_) => 3,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let store = JsonStore::open(&cli.registry)?;
    let mut registry = Registry::new(store);

    let outcome = execute(cli.command, &mut registry);
    // Record-level transactions: whatever was committed before a fatal
    // error still lands in the snapshot.
    let saved = registry.store().save();
    let outcome = finish(outcome, saved)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print(&outcome).into_diagnostic()?,
        OutputMode::Human => print_outcome(&outcome),
    }
    Ok(())
}

/// Reconcile the run result with the snapshot save result. The run error
/// owns the exit status, but a failed save is never dropped: it either
/// propagates itself or is logged alongside the run error.
fn finish<T>(
    outcome: Result<T, RegistryError>,
    saved: Result<(), RegistryError>,
) -> Result<T, RegistryError> {
    match (outcome, saved) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(save_err)) => Err(save_err),
        (Err(run_err), Ok(())) => Err(run_err),
        (Err(run_err), Err(save_err)) => {
            error!(error = %save_err, "registry snapshot was not saved");
            Err(run_err)
        }
    }
}

fn execute(
    command: Commands,
    registry: &mut Registry<JsonStore>,
) -> Result<CommandOutcome, RegistryError> {
    match command {
        Commands::RegisterOrganism { taxonomy_id, name } => {
            registry.store_mut().upsert_organism(Organism {
                taxonomy_id,
                name: name.clone(),
            })?;
            Ok(CommandOutcome::OrganismRegistered { taxonomy_id, name })
        }
        Commands::RegisterXrdb { name, url_template } => {
            let xrdb = CrossRefDb::new(&name, &url_template)?;
            let name = xrdb.name.clone();
            let outcome = match registry.register_xrdb(xrdb)? {
                XrdbOutcome::Created => "created",
                XrdbOutcome::Updated => "updated",
                XrdbOutcome::Unchanged => "unchanged",
            };
            Ok(CommandOutcome::XrdbRegistered {
                name,
                outcome: outcome.to_string(),
            })
        }
        Commands::LoadGeneinfo {
            file,
            taxonomy_id,
            systematic_col,
            symbol_col,
            alias_col,
            alt_taxonomy_id,
            put_systematic_in_xrdb,
        } => {
            let mut options = GeneInfoOptions::new(InputSource::Path(file), taxonomy_id)
                .alias_col_from_arg(&alias_col)?;
            options.systematic_col = systematic_col;
            options.symbol_col = symbol_col;
            options.alt_taxonomy_id = alt_taxonomy_id;
            options.put_systematic_in_xrdb = put_systematic_in_xrdb;
            Ok(CommandOutcome::Load(geneinfo::run(registry, &options)?))
        }
        Commands::LoadUniprot { file } => {
            let options = UniProtOptions {
                source: InputSource::Path(file),
            };
            Ok(CommandOutcome::Load(uniprot::run(registry, &options)?))
        }
        Commands::LoadWormbase {
            url,
            taxonomy_id,
            xrdb_name,
        } => {
            let mut options = WormBaseOptions::new(InputSource::Url(url), taxonomy_id);
            options.xrdb_name = xrdb_name;
            Ok(CommandOutcome::Load(wormbase::run(registry, &options)?))
        }
        Commands::LoadGeneHistory {
            file,
            tax_id,
            tax_id_col,
            discontinued_id_col,
            discontinued_symbol_col,
        } => {
            let mut options = GeneHistoryOptions::new(InputSource::Path(file), tax_id);
            options.tax_id_col = tax_id_col;
            options.discontinued_id_col = discontinued_id_col;
            options.discontinued_symbol_col = discontinued_symbol_col;
            Ok(CommandOutcome::Load(history::run(registry, &options)?))
        }
    }
}


fn print_outcome(outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::OrganismRegistered { taxonomy_id, name } => {
            println!("registered organism {name} (taxonomy {taxonomy_id})");
        }
        CommandOutcome::XrdbRegistered { name, outcome } => {
            println!("cross-reference database {name}: {outcome}");
        }
        CommandOutcome::Load(summary) => {
            println!("loaded {}", summary.source);
            println!(
                "  records: {} processed, {} skipped",
                summary.records_processed,
                summary.total_skipped()
            );
            println!(
                "  genes: {} created, {} updated, {} unchanged, {} obsoleted",
                summary.genes_created,
                summary.genes_updated,
                summary.genes_unchanged,
                summary.genes_obsoleted
            );
            println!("  cross-references created: {}", summary.xrefs_created);
            if summary.total_skipped() > 0 {
                println!(
                    "  skips: {} malformed, {} unresolved, {} unknown xrdb, {} irrelevant",
                    summary.skipped_malformed,
                    summary.skipped_unresolved,
                    summary.skipped_unknown_xrdb,
                    summary.skipped_irrelevant
                );
            }
        }
    }
}
