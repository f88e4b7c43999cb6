use tracing::{info, warn};

use crate::domain::{EntrezId, TaxonomyId};
use crate::error::RegistryError;
use crate::parser::{ColumnMap, InputSource, LineFormat, Parsed, Records};
use crate::registry::{ObsoleteOutcome, Registry, RunSummary};
use crate::store::RecordStore;

#[derive(Debug, Clone)]
pub struct GeneHistoryOptions {
    pub source: InputSource,
    pub taxonomy_id: TaxonomyId,
    pub tax_id_col: usize,
    pub discontinued_id_col: usize,
    pub discontinued_symbol_col: usize,
}

impl GeneHistoryOptions {
    pub fn new(source: InputSource, taxonomy_id: TaxonomyId) -> Self {
        Self {
            source,
            taxonomy_id,
            tax_id_col: 1,
            discontinued_id_col: 3,
            discontinued_symbol_col: 4,
        }
    }
}

/// Load an NCBI gene_history file. Genes found by discontinued entrez id
/// are flipped to obsolete in place; unknown ids get a new obsolete stub.
/// The transition is one-directional: this adapter never clears the flag.
pub fn run<S: RecordStore>(
    registry: &mut Registry<S>,
    options: &GeneHistoryOptions,
) -> Result<RunSummary, RegistryError> {
    let organism = registry.organism(options.taxonomy_id)?;

    let map = ColumnMap::new()
        .column("tax_id", options.tax_id_col)
        .column("discontinued_id", options.discontinued_id_col)
        .column("discontinued_symbol", options.discontinued_symbol_col);
    let records = Records::open(&options.source, map, LineFormat::default())?;

    let mut summary = RunSummary::new(options.source.describe());
    let tax_id = options.taxonomy_id.to_string();
    for parsed in records {
        let record = match parsed? {
            Parsed::Record(record) => record,
            Parsed::Skipped(issue) => {
                warn!(%issue, "skipping record");
                summary.note_issue(&issue);
                continue;
            }
        };

        if record.get("tax_id") != tax_id {
            continue;
        }
        summary.records_processed += 1;

        let entrez_id = match record.get_i64("discontinued_id") {
            Ok(value) => EntrezId::new(value),
            Err(issue) => {
                warn!(%issue, "skipping record");
                summary.note_issue(&issue);
                continue;
            }
        };
        let outcome = registry.mark_obsolete_by_entrez(
            organism.taxonomy_id,
            entrez_id,
            record.get("discontinued_symbol"),
        )?;
        match outcome {
            ObsoleteOutcome::Marked => summary.genes_obsoleted += 1,
            ObsoleteOutcome::AlreadyObsolete => summary.genes_unchanged += 1,
            ObsoleteOutcome::CreatedObsolete => summary.genes_created += 1,
        }
    }

    info!(
        obsoleted = summary.genes_obsoleted,
        created = summary.genes_created,
        unchanged = summary.genes_unchanged,
        "gene_history load finished"
    );
    Ok(summary)
}
