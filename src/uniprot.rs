use std::collections::HashMap;

use tracing::{info, warn};

use crate::domain::{EntrezId, GeneId};
use crate::error::{RecordIssue, RegistryError};
use crate::parser::{ColumnMap, Delimiter, InputSource, LineFormat, Parsed, Records};
use crate::registry::{Registry, RunSummary};
use crate::store::RecordStore;

pub const UNIPROT_XRDB: &str = "UniProtKB";
pub const ENSEMBL_XRDB: &str = "Ensembl";

#[derive(Debug, Clone)]
pub struct UniProtOptions {
    /// Pre-filtered idmapping file: accession, mapping kind, mapped id.
    /// `zgrep -e "GeneID" -e "Ensembl" idmapping.dat.gz` produces it.
    pub source: InputSource,
}

#[derive(Debug, Clone)]
struct MappingRow {
    line: u64,
    accession: String,
    kind: String,
    value: String,
}

/// Load UniProt accessions as cross-references. `GeneID` rows resolve a
/// gene by entrez id and add a UniProtKB xref; `Ensembl` rows resolve
/// through the accession seen in a `GeneID` row and add an Ensembl xref.
/// The upstream id universe is larger than the local registry, so lookup
/// misses are tallied skips, not failures.
pub fn run<S: RecordStore>(
    registry: &mut Registry<S>,
    options: &UniProtOptions,
) -> Result<RunSummary, RegistryError> {
    registry.require_xrdb(UNIPROT_XRDB)?;

    let map = ColumnMap::new()
        .column("accession", 1)
        .column("kind", 2)
        .column("value", 3);
    let format = LineFormat {
        delimiter: Delimiter::Whitespace,
        ..LineFormat::default()
    };
    let records = Records::open(&options.source, map, format)?;

    let mut summary = RunSummary::new(options.source.describe());

    // idmapping does not guarantee GeneID rows ahead of Ensembl rows for an
    // accession, so collect first and resolve in two passes.
    let mut rows: Vec<MappingRow> = Vec::new();
    for parsed in records {
        match parsed? {
            Parsed::Record(record) => {
                let kind = record.get("kind");
                // The zgrep pre-filter also passes Ensembl_TRS/Ensembl_PRO
                // and similar kinds; count them so the summary adds up.
                if kind != "GeneID" && kind != "Ensembl" {
                    summary.skipped_irrelevant += 1;
                    continue;
                }
                rows.push(MappingRow {
                    line: record.line(),
                    accession: record.get("accession").to_string(),
                    kind: kind.to_string(),
                    value: record.get("value").to_string(),
                });
            }
            Parsed::Skipped(issue) => {
                warn!(%issue, "skipping record");
                summary.note_issue(&issue);
            }
        }
    }

    let mut resolved: HashMap<String, GeneId> = HashMap::new();
    for row in rows.iter().filter(|row| row.kind == "GeneID") {
        summary.records_processed += 1;
        let entrez_id = match row.value.trim().parse::<i64>() {
            Ok(value) => EntrezId::new(value),
            Err(_) => {
                let issue = RecordIssue::Malformed {
                    line: row.line,
                    reason: format!("GeneID value is not numeric: {:?}", row.value),
                };
                warn!(%issue, "skipping record");
                summary.note_issue(&issue);
                continue;
            }
        };
        let Some(gene) = registry.find_gene_by_entrez(entrez_id)? else {
            let issue = RecordIssue::UnresolvedGene {
                identifier: format!("entrez:{entrez_id}"),
            };
            summary.note_issue(&issue);
            continue;
        };
        resolved.insert(row.accession.clone(), gene.id);
        if registry.add_xref(gene.id, UNIPROT_XRDB, &row.accession)? {
            summary.xrefs_created += 1;
        }
    }

    for row in rows.iter().filter(|row| row.kind == "Ensembl") {
        summary.records_processed += 1;
        let Some(gene) = resolved.get(&row.accession) else {
            let issue = RecordIssue::UnresolvedGene {
                identifier: format!("uniprot:{}", row.accession),
            };
            summary.note_issue(&issue);
            continue;
        };
        if registry.add_xref(*gene, ENSEMBL_XRDB, &row.value)? {
            summary.xrefs_created += 1;
        }
    }

    info!(
        xrefs = summary.xrefs_created,
        unresolved = summary.skipped_unresolved,
        "uniprot load finished"
    );
    Ok(summary)
}
