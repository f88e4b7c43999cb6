use tracing::{info, warn};

use crate::domain::TaxonomyId;
use crate::error::{RecordIssue, RegistryError};
use crate::parser::{ColumnMap, InputSource, LineFormat, Parsed, Records};
use crate::registry::{Registry, RunSummary};
use crate::store::RecordStore;

pub const DEFAULT_XRDB: &str = "WormBase";

/// WormBase dumps carry bare locus names; the registry stores them with
/// this prefix in the systematic id.
const SYSTEMATIC_PREFIX: &str = "CELE_";

#[derive(Debug, Clone)]
pub struct WormBaseOptions {
    /// Usually the URL of a gzipped xrefs dump from the WormBase release
    /// area; any readable source works.
    pub source: InputSource,
    pub xrdb_name: String,
    pub taxonomy_id: TaxonomyId,
}

impl WormBaseOptions {
    pub fn new(source: InputSource, taxonomy_id: TaxonomyId) -> Self {
        Self {
            source,
            xrdb_name: DEFAULT_XRDB.to_string(),
            taxonomy_id,
        }
    }
}

/// Load WormBase identifiers as cross-references, resolving genes through
/// their prefixed systematic id. Lookup misses are tallied skips; a missing
/// xrdb is a fatal precondition failure.
pub fn run<S: RecordStore>(
    registry: &mut Registry<S>,
    options: &WormBaseOptions,
) -> Result<RunSummary, RegistryError> {
    let organism = registry.organism(options.taxonomy_id)?;
    registry.require_xrdb(&options.xrdb_name)?;

    let map = ColumnMap::new().column("locus", 1).column("wb_id", 2);
    let records = Records::open(&options.source, map, LineFormat::default())?;

    let mut summary = RunSummary::new(options.source.describe());
    for parsed in records {
        let record = match parsed? {
            Parsed::Record(record) => record,
            Parsed::Skipped(issue) => {
                warn!(%issue, "skipping record");
                summary.note_issue(&issue);
                continue;
            }
        };
        summary.records_processed += 1;

        let systematic = format!("{SYSTEMATIC_PREFIX}{}", record.get("locus"));
        let Some(gene) = registry.gene_by_systematic(organism.taxonomy_id, &systematic)? else {
            let issue = RecordIssue::UnresolvedGene {
                identifier: systematic,
            };
            summary.note_issue(&issue);
            continue;
        };
        if registry.add_xref(gene.id, &options.xrdb_name, record.get("wb_id"))? {
            summary.xrefs_created += 1;
        }
    }

    info!(
        xrefs = summary.xrefs_created,
        unresolved = summary.skipped_unresolved,
        "wormbase load finished"
    );
    Ok(summary)
}
