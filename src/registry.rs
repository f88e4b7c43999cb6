use serde::Serialize;
use tracing::debug;

use crate::domain::{
    CrossRef, CrossRefDb, EntrezId, Gene, GeneId, Organism, TaxonomyId, dedup_preserve_order,
};
use crate::error::{RecordIssue, RegistryError};
use crate::store::{NewGene, RecordStore};

/// Canonical gene registry. Wraps a [`RecordStore`] and applies the
/// reconciliation rules shared by every source adapter:
///
/// 1. cross-reference writes require a pre-registered xrdb (fatal when
///    violated),
/// 2. gene lookup misses during xref loading are per-record skips,
/// 3. gene identity is (organism, entrez_id) when entrez is present, else
///    (organism, systematic_id),
/// 4. the obsolete flag is one-directional: once set it is never cleared.
pub struct Registry<S: RecordStore> {
    store: S,
}

/// What a gene upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// What an xrdb registration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrdbOutcome {
    Created,
    Updated,
    Unchanged,
}

/// What a gene-history record did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObsoleteOutcome {
    Marked,
    AlreadyObsolete,
    CreatedObsolete,
}

/// Gene fields as extracted from a source file, before identity resolution.
#[derive(Debug, Clone)]
pub struct GeneDraft {
    pub entrez_id: Option<EntrezId>,
    pub systematic_id: String,
    pub symbol: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub chromosome: String,
    pub type_of_gene: String,
}

impl<S: RecordStore> Registry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Escape hatch for collaborator-owned entities (organisms); the
    /// reconciliation rules only govern genes and cross-references.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Organisms are an external collaborator: looked up, never created here.
    pub fn organism(&self, taxonomy_id: TaxonomyId) -> Result<Organism, RegistryError> {
        self.store
            .organism(taxonomy_id)?
            .ok_or(RegistryError::OrganismNotFound(taxonomy_id))
    }

    /// Register or refresh a cross-reference database. The URL template is
    /// updated in place when it changed; names are immutable keys.
    pub fn register_xrdb(&mut self, xrdb: CrossRefDb) -> Result<XrdbOutcome, RegistryError> {
        match self.store.xrdb(&xrdb.name)? {
            Some(existing) if existing.url_template == xrdb.url_template => {
                Ok(XrdbOutcome::Unchanged)
            }
            Some(_) => {
                self.store.upsert_xrdb(xrdb)?;
                Ok(XrdbOutcome::Updated)
            }
            None => {
                self.store.upsert_xrdb(xrdb)?;
                Ok(XrdbOutcome::Created)
            }
        }
    }

    pub fn xrdb_exists(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.store.xrdb(name)?.is_some())
    }

    /// Fetch an xrdb that adapter configuration requires to pre-exist.
    /// Absence is a setup/ordering mistake, not dirty data, so it aborts
    /// the run.
    pub fn require_xrdb(&self, name: &str) -> Result<CrossRefDb, RegistryError> {
        self.store
            .xrdb(name)?
            .ok_or_else(|| RegistryError::MissingCrossRefDb(name.to_string()))
    }

    pub fn gene_by_entrez(
        &self,
        taxonomy_id: TaxonomyId,
        entrez_id: EntrezId,
    ) -> Result<Option<Gene>, RegistryError> {
        self.store.gene_by_entrez(taxonomy_id, entrez_id)
    }

    pub fn gene_by_systematic(
        &self,
        taxonomy_id: TaxonomyId,
        systematic_id: &str,
    ) -> Result<Option<Gene>, RegistryError> {
        self.store.gene_by_systematic(taxonomy_id, systematic_id)
    }

    pub fn find_gene_by_entrez(&self, entrez_id: EntrezId) -> Result<Option<Gene>, RegistryError> {
        self.store.find_gene_by_entrez(entrez_id)
    }

    pub fn genes_for_organism(&self, taxonomy_id: TaxonomyId) -> Result<Vec<Gene>, RegistryError> {
        self.store.genes_for_organism(taxonomy_id)
    }

    /// Insert-or-refresh a gene under the natural-key policy. A refresh is
    /// last-file-wins on symbol, systematic id, aliases, description,
    /// chromosome and type; it never touches the obsolete flag.
    pub fn upsert_gene(
        &mut self,
        taxonomy_id: TaxonomyId,
        draft: GeneDraft,
    ) -> Result<(Gene, UpsertOutcome), RegistryError> {
        let existing = match draft.entrez_id {
            Some(entrez_id) => self.store.gene_by_entrez(taxonomy_id, entrez_id)?,
            None => self
                .store
                .gene_by_systematic(taxonomy_id, &draft.systematic_id)?,
        };
        let aliases = dedup_preserve_order(draft.aliases);

        match existing {
            Some(mut gene) => {
                let mut changed = false;
                if gene.systematic_id != draft.systematic_id {
                    gene.systematic_id = draft.systematic_id;
                    changed = true;
                }
                if gene.symbol != draft.symbol {
                    gene.symbol = draft.symbol;
                    changed = true;
                }
                if gene.aliases != aliases {
                    gene.aliases = aliases;
                    changed = true;
                }
                if gene.description != draft.description {
                    gene.description = draft.description;
                    changed = true;
                }
                if gene.chromosome != draft.chromosome {
                    gene.chromosome = draft.chromosome;
                    changed = true;
                }
                if gene.type_of_gene != draft.type_of_gene {
                    gene.type_of_gene = draft.type_of_gene;
                    changed = true;
                }
                if changed {
                    self.store.update_gene(&gene)?;
                    debug!(gene = %gene.id, "refreshed gene");
                    Ok((gene, UpsertOutcome::Updated))
                } else {
                    Ok((gene, UpsertOutcome::Unchanged))
                }
            }
            None => {
                let gene = self.store.insert_gene(NewGene {
                    taxonomy_id,
                    entrez_id: draft.entrez_id,
                    systematic_id: draft.systematic_id,
                    symbol: draft.symbol,
                    aliases,
                    description: draft.description,
                    chromosome: draft.chromosome,
                    type_of_gene: draft.type_of_gene,
                    obsolete: false,
                })?;
                debug!(gene = %gene.id, "created gene");
                Ok((gene, UpsertOutcome::Created))
            }
        }
    }

    /// Apply a gene-history record: flip an existing gene to obsolete (flag
    /// only, no field overwrite), or insert a new obsolete stub carrying the
    /// discontinued id and symbol.
    pub fn mark_obsolete_by_entrez(
        &mut self,
        taxonomy_id: TaxonomyId,
        entrez_id: EntrezId,
        discontinued_symbol: &str,
    ) -> Result<ObsoleteOutcome, RegistryError> {
        match self.store.gene_by_entrez(taxonomy_id, entrez_id)? {
            Some(gene) if gene.obsolete => Ok(ObsoleteOutcome::AlreadyObsolete),
            Some(mut gene) => {
                gene.obsolete = true;
                self.store.update_gene(&gene)?;
                Ok(ObsoleteOutcome::Marked)
            }
            None => {
                self.store.insert_gene(NewGene {
                    taxonomy_id,
                    entrez_id: Some(entrez_id),
                    systematic_id: String::new(),
                    symbol: discontinued_symbol.to_string(),
                    aliases: Vec::new(),
                    description: String::new(),
                    chromosome: String::new(),
                    type_of_gene: String::new(),
                    obsolete: true,
                })?;
                Ok(ObsoleteOutcome::CreatedObsolete)
            }
        }
    }

    /// Mark a known gene obsolete (obsolescence sweep). No-op when the flag
    /// is already set.
    pub fn mark_obsolete(&mut self, gene: &Gene) -> Result<bool, RegistryError> {
        if gene.obsolete {
            return Ok(false);
        }
        let mut gene = gene.clone();
        gene.obsolete = true;
        self.store.update_gene(&gene)?;
        Ok(true)
    }

    /// Add a cross-reference under a pre-registered xrdb. The (gene, xrdb,
    /// identifier) triple is unique; returns whether a row was created.
    pub fn add_xref(
        &mut self,
        gene: GeneId,
        xrdb_name: &str,
        identifier: &str,
    ) -> Result<bool, RegistryError> {
        let xrdb = self.require_xrdb(xrdb_name)?;
        if self.store.xref_exists(gene, &xrdb.name, identifier)? {
            return Ok(false);
        }
        self.store.insert_xref(CrossRef {
            gene,
            xrdb: xrdb.name,
            identifier: identifier.to_string(),
        })?;
        Ok(true)
    }

    /// Read access for a document-building indexer.
    pub fn document_for(&self, gene: &Gene) -> Result<IndexDocument, RegistryError> {
        let xref_identifiers = self
            .store
            .xrefs_for_gene(gene.id)?
            .into_iter()
            .map(|xref| xref.identifier)
            .collect();
        Ok(IndexDocument {
            gene: gene.id,
            taxonomy_id: gene.taxonomy_id,
            entrez_id: gene.entrez_id,
            symbol: gene.symbol.clone(),
            systematic_id: gene.systematic_id.clone(),
            aliases: gene.aliases_joined(),
            description: gene.description.clone(),
            obsolete: gene.obsolete,
            xref_identifiers,
        })
    }

    pub fn index_documents(
        &self,
        taxonomy_id: TaxonomyId,
    ) -> Result<Vec<IndexDocument>, RegistryError> {
        self.store
            .genes_for_organism(taxonomy_id)?
            .iter()
            .map(|gene| self.document_for(gene))
            .collect()
    }
}

/// Flat view of one gene for an external search indexer. The core exposes
/// the fields; it does not build or weight the index document.
#[derive(Debug, Clone, Serialize)]
pub struct IndexDocument {
    pub gene: GeneId,
    pub taxonomy_id: TaxonomyId,
    pub entrez_id: Option<EntrezId>,
    pub symbol: String,
    pub systematic_id: String,
    pub aliases: String,
    pub description: String,
    pub obsolete: bool,
    pub xref_identifiers: Vec<String>,
}

/// Per-run tallies. Every skip is counted here and surfaced in run output;
/// nothing is silently dropped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub records_processed: u64,
    pub genes_created: u64,
    pub genes_updated: u64,
    pub genes_unchanged: u64,
    pub genes_obsoleted: u64,
    pub xrefs_created: u64,
    pub skipped_malformed: u64,
    pub skipped_unresolved: u64,
    pub skipped_unknown_xrdb: u64,
    /// Rows a source file carries but the adapter does not load (e.g.
    /// idmapping kinds other than the two it consumes).
    pub skipped_irrelevant: u64,
}

impl RunSummary {
    pub fn new(source: String) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    pub fn note_upsert(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.genes_created += 1,
            UpsertOutcome::Updated => self.genes_updated += 1,
            UpsertOutcome::Unchanged => self.genes_unchanged += 1,
        }
    }

    pub fn note_issue(&mut self, issue: &RecordIssue) {
        match issue {
            RecordIssue::Malformed { .. } => self.skipped_malformed += 1,
            RecordIssue::UnresolvedGene { .. } => self.skipped_unresolved += 1,
            RecordIssue::UnknownXrdb { .. } => self.skipped_unknown_xrdb += 1,
        }
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped_malformed
            + self.skipped_unresolved
            + self.skipped_unknown_xrdb
            + self.skipped_irrelevant
    }
}
