use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::domain::{EntrezId, TaxonomyId};
use crate::error::{RecordIssue, RegistryError};
use crate::parser::{
    ColumnMap, ColumnSource, InputSource, LineFormat, Parsed, Records, parse_column_source,
};
use crate::registry::{GeneDraft, Registry, RunSummary};
use crate::store::RecordStore;

/// Fixed 1-based positions in NCBI gene_info files. Only the symbol,
/// systematic and alias columns move between sources, so only those are
/// operator-configurable.
const TAX_ID_COL: usize = 1;
const ENTREZ_COL: usize = 2;
const DBXREFS_COL: usize = 6;
const CHROMOSOME_COL: usize = 7;
const DESCRIPTION_COL: usize = 9;
const TYPE_OF_GENE_COL: usize = 10;

/// Placeholder rows NCBI keeps for identifiers that are reserved but not
/// yet annotated.
const NEWENTRY_SYMBOL: &str = "NEWENTRY";

/// Below this many organism matches the file almost certainly belongs to a
/// different taxonomy id, so the obsolescence sweep is not safe to run.
const MIN_MATCHES_FOR_SWEEP: u64 = 10;

#[derive(Debug, Clone)]
pub struct GeneInfoOptions {
    pub source: InputSource,
    pub taxonomy_id: TaxonomyId,
    pub systematic_col: usize,
    pub symbol_col: usize,
    pub alias_col: ColumnSource,
    /// Some organisms (S. cerevisiae) carry a different tax id in the NCBI
    /// file than in the local registry.
    pub alt_taxonomy_id: Option<TaxonomyId>,
    /// Also register systematic ids as cross-references under this xrdb
    /// (used for Pseudomonas, where systematic ids live in PseudoCAP).
    pub put_systematic_in_xrdb: Option<String>,
}

impl GeneInfoOptions {
    pub fn new(source: InputSource, taxonomy_id: TaxonomyId) -> Self {
        Self {
            source,
            taxonomy_id,
            systematic_col: 3,
            symbol_col: 2,
            alias_col: ColumnSource::Column(4),
            alt_taxonomy_id: None,
            put_systematic_in_xrdb: None,
        }
    }

    /// Accepts the CLI sentinel: `-` or blank reuses the symbol column.
    pub fn alias_col_from_arg(mut self, raw: &str) -> Result<Self, RegistryError> {
        self.alias_col = parse_column_source("alias_col", raw, "symbol")?;
        Ok(self)
    }
}

/// Load an NCBI gene_info file: upsert one gene per matching row, refresh
/// fields last-file-wins, then mark registry genes absent from the file as
/// obsolete.
pub fn run<S: RecordStore>(
    registry: &mut Registry<S>,
    options: &GeneInfoOptions,
) -> Result<RunSummary, RegistryError> {
    let organism = registry.organism(options.taxonomy_id)?;
    if let Some(name) = &options.put_systematic_in_xrdb {
        registry.require_xrdb(name)?;
    }

    let map = ColumnMap::new()
        .column("tax_id", TAX_ID_COL)
        .column("entrez", ENTREZ_COL)
        .column("symbol", options.symbol_col)
        .column("systematic", options.systematic_col)
        .source("alias", options.alias_col.clone())
        .column("dbxrefs", DBXREFS_COL)
        .column("chromosome", CHROMOSOME_COL)
        .column("description", DESCRIPTION_COL)
        .column("type_of_gene", TYPE_OF_GENE_COL);
    let records = Records::open(&options.source, map, LineFormat::default())?;

    let mut summary = RunSummary::new(options.source.describe());
    let primary = options.taxonomy_id.to_string();
    let alternate = options.alt_taxonomy_id.map(|id| id.to_string());
    let mut entrez_seen: HashSet<EntrezId> = HashSet::new();
    // Per-run cache of xrdb existence, saves a store hit per dbXrefs pair.
    let mut xrdb_known: HashMap<String, bool> = HashMap::new();

    for parsed in records {
        let record = match parsed? {
            Parsed::Record(record) => record,
            Parsed::Skipped(issue) => {
                warn!(%issue, "skipping record");
                summary.note_issue(&issue);
                continue;
            }
        };

        let row_tax = record.get("tax_id");
        if row_tax != primary && alternate.as_deref() != Some(row_tax) {
            continue;
        }
        let symbol = record.get("symbol").to_string();
        if symbol == NEWENTRY_SYMBOL {
            continue;
        }
        summary.records_processed += 1;

        let entrez_id = match record.get_i64("entrez") {
            Ok(value) => EntrezId::new(value),
            Err(issue) => {
                warn!(%issue, "skipping record");
                summary.note_issue(&issue);
                continue;
            }
        };

        let mut systematic = record.get("systematic").to_string();
        if systematic.is_empty() || systematic == "-" {
            systematic = symbol.clone();
        }
        // Mitochondrial copies share symbols with their nuclear twins;
        // prefix them the way GeneCards does.
        if record.get("chromosome") == "MT" && !systematic.starts_with("MT-") {
            debug!(from = %systematic, "renaming mitochondrial gene");
            systematic = format!("MT-{systematic}");
        }

        let raw_alias = record.get("alias");
        let aliases: Vec<String> = if raw_alias.is_empty() || raw_alias == "-" {
            Vec::new()
        } else {
            raw_alias.split('|').map(str::to_string).collect()
        };

        entrez_seen.insert(entrez_id);
        let (gene, outcome) = registry.upsert_gene(
            organism.taxonomy_id,
            GeneDraft {
                entrez_id: Some(entrez_id),
                systematic_id: systematic.clone(),
                symbol,
                aliases,
                description: record.get("description").to_string(),
                chromosome: record.get("chromosome").to_string(),
                type_of_gene: record.get("type_of_gene").to_string(),
            },
        )?;
        summary.note_upsert(outcome);

        if let Some(xrdb_name) = &options.put_systematic_in_xrdb
            && registry.add_xref(gene.id, xrdb_name, &systematic)?
        {
            summary.xrefs_created += 1;
        }

        // Opportunistic cross-references from the dbXrefs column. Unknown
        // databases here are dirty upstream data, not an operator mistake:
        // tally and move on.
        let dbxrefs = record.get("dbxrefs");
        if !dbxrefs.is_empty() && dbxrefs != "-" {
            for pair in dbxrefs.split('|') {
                let Some((db, identifier)) = pair.split_once(':') else {
                    let issue = RecordIssue::Malformed {
                        line: record.line(),
                        reason: format!("dbXrefs pair without separator: {pair:?}"),
                    };
                    warn!(%issue, "skipping cross-reference");
                    summary.note_issue(&issue);
                    continue;
                };
                let known = match xrdb_known.get(db) {
                    Some(known) => *known,
                    None => {
                        let known = registry.xrdb_exists(db)?;
                        xrdb_known.insert(db.to_string(), known);
                        known
                    }
                };
                if !known {
                    let issue = RecordIssue::UnknownXrdb {
                        name: db.to_string(),
                    };
                    debug!(%issue, "skipping cross-reference");
                    summary.note_issue(&issue);
                    continue;
                }
                if registry.add_xref(gene.id, db, identifier)? {
                    summary.xrefs_created += 1;
                }
            }
        }
    }

    if summary.records_processed < MIN_MATCHES_FOR_SWEEP {
        warn!(
            matched = summary.records_processed,
            taxonomy_id = %options.taxonomy_id,
            "too few organism matches; skipping obsolescence sweep"
        );
    } else {
        for gene in registry.genes_for_organism(organism.taxonomy_id)? {
            let Some(entrez_id) = gene.entrez_id else {
                continue;
            };
            if !entrez_seen.contains(&entrez_id) && registry.mark_obsolete(&gene)? {
                summary.genes_obsoleted += 1;
            }
        }
    }

    info!(
        created = summary.genes_created,
        updated = summary.genes_updated,
        unchanged = summary.genes_unchanged,
        obsoleted = summary.genes_obsoleted,
        skipped = summary.total_skipped(),
        "gene_info load finished"
    );
    Ok(summary)
}
