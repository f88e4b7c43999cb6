use std::collections::HashMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{CrossRef, CrossRefDb, EntrezId, Gene, GeneId, Organism, TaxonomyId};
use crate::error::RegistryError;

/// Record-oriented persistence interface: get-by-natural-key, insert and
/// update-in-place for every entity the registry owns. The embedding
/// application decides what backs it; this crate ships an in-memory backend
/// and a JSON snapshot backend for the CLI.
pub trait RecordStore {
    fn organism(&self, taxonomy_id: TaxonomyId) -> Result<Option<Organism>, RegistryError>;
    fn upsert_organism(&mut self, organism: Organism) -> Result<(), RegistryError>;

    fn gene_by_entrez(
        &self,
        taxonomy_id: TaxonomyId,
        entrez_id: EntrezId,
    ) -> Result<Option<Gene>, RegistryError>;
    fn gene_by_systematic(
        &self,
        taxonomy_id: TaxonomyId,
        systematic_id: &str,
    ) -> Result<Option<Gene>, RegistryError>;
    /// Organism-agnostic entrez lookup; UniProt id-mapping files carry no
    /// taxonomy column.
    fn find_gene_by_entrez(&self, entrez_id: EntrezId) -> Result<Option<Gene>, RegistryError>;
    fn genes_for_organism(&self, taxonomy_id: TaxonomyId) -> Result<Vec<Gene>, RegistryError>;
    fn insert_gene(&mut self, gene: NewGene) -> Result<Gene, RegistryError>;
    fn update_gene(&mut self, gene: &Gene) -> Result<(), RegistryError>;

    fn xrdb(&self, name: &str) -> Result<Option<CrossRefDb>, RegistryError>;
    fn upsert_xrdb(&mut self, xrdb: CrossRefDb) -> Result<(), RegistryError>;

    fn xref_exists(
        &self,
        gene: GeneId,
        xrdb: &str,
        identifier: &str,
    ) -> Result<bool, RegistryError>;
    fn insert_xref(&mut self, xref: CrossRef) -> Result<(), RegistryError>;
    fn xrefs_for_gene(&self, gene: GeneId) -> Result<Vec<CrossRef>, RegistryError>;
}

/// A gene as handed to the store for insertion, before a surrogate id is
/// assigned.
#[derive(Debug, Clone)]
pub struct NewGene {
    pub taxonomy_id: TaxonomyId,
    pub entrez_id: Option<EntrezId>,
    pub systematic_id: String,
    pub symbol: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub chromosome: String,
    pub type_of_gene: String,
    pub obsolete: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    organisms: HashMap<TaxonomyId, Organism>,
    genes: HashMap<GeneId, Gene>,
    // Secondary key maps; a full gene_info load looks genes up per row.
    // Entrez ids are globally unique upstream, so one map serves both the
    // scoped and the organism-agnostic lookup.
    by_entrez: HashMap<EntrezId, GeneId>,
    by_systematic: HashMap<(TaxonomyId, String), GeneId>,
    xrdbs: HashMap<String, CrossRefDb>,
    xrefs: Vec<CrossRef>,
    next_gene_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_gene(&mut self, gene: &Gene) {
        if let Some(entrez_id) = gene.entrez_id {
            self.by_entrez.insert(entrez_id, gene.id);
        }
        self.by_systematic
            .insert((gene.taxonomy_id, gene.systematic_id.clone()), gene.id);
    }

    fn unindex_gene(&mut self, gene: &Gene) {
        if let Some(entrez_id) = gene.entrez_id
            && self.by_entrez.get(&entrez_id) == Some(&gene.id)
        {
            self.by_entrez.remove(&entrez_id);
        }
        let key = (gene.taxonomy_id, gene.systematic_id.clone());
        if self.by_systematic.get(&key) == Some(&gene.id) {
            self.by_systematic.remove(&key);
        }
    }
}

impl RecordStore for MemoryStore {
    fn organism(&self, taxonomy_id: TaxonomyId) -> Result<Option<Organism>, RegistryError> {
        Ok(self.organisms.get(&taxonomy_id).cloned())
    }

    fn upsert_organism(&mut self, organism: Organism) -> Result<(), RegistryError> {
        self.organisms.insert(organism.taxonomy_id, organism);
        Ok(())
    }

    fn gene_by_entrez(
        &self,
        taxonomy_id: TaxonomyId,
        entrez_id: EntrezId,
    ) -> Result<Option<Gene>, RegistryError> {
        Ok(self
            .by_entrez
            .get(&entrez_id)
            .and_then(|id| self.genes.get(id))
            .filter(|gene| gene.taxonomy_id == taxonomy_id)
            .cloned())
    }

    fn gene_by_systematic(
        &self,
        taxonomy_id: TaxonomyId,
        systematic_id: &str,
    ) -> Result<Option<Gene>, RegistryError> {
        Ok(self
            .by_systematic
            .get(&(taxonomy_id, systematic_id.to_string()))
            .and_then(|id| self.genes.get(id))
            .cloned())
    }

    fn find_gene_by_entrez(&self, entrez_id: EntrezId) -> Result<Option<Gene>, RegistryError> {
        Ok(self
            .by_entrez
            .get(&entrez_id)
            .and_then(|id| self.genes.get(id))
            .cloned())
    }

    fn genes_for_organism(&self, taxonomy_id: TaxonomyId) -> Result<Vec<Gene>, RegistryError> {
        let mut genes: Vec<Gene> = self
            .genes
            .values()
            .filter(|gene| gene.taxonomy_id == taxonomy_id)
            .cloned()
            .collect();
        genes.sort_by_key(|gene| gene.id);
        Ok(genes)
    }

    fn insert_gene(&mut self, gene: NewGene) -> Result<Gene, RegistryError> {
        self.next_gene_id += 1;
        let gene = Gene {
            id: GeneId::new(self.next_gene_id),
            taxonomy_id: gene.taxonomy_id,
            entrez_id: gene.entrez_id,
            systematic_id: gene.systematic_id,
            symbol: gene.symbol,
            aliases: gene.aliases,
            description: gene.description,
            chromosome: gene.chromosome,
            type_of_gene: gene.type_of_gene,
            obsolete: gene.obsolete,
        };
        self.index_gene(&gene);
        self.genes.insert(gene.id, gene.clone());
        Ok(gene)
    }

    fn update_gene(&mut self, gene: &Gene) -> Result<(), RegistryError> {
        let Some(old) = self.genes.get(&gene.id).cloned() else {
            return Err(RegistryError::Storage(format!(
                "update of unknown gene id {}",
                gene.id
            )));
        };
        self.unindex_gene(&old);
        self.index_gene(gene);
        self.genes.insert(gene.id, gene.clone());
        Ok(())
    }

    fn xrdb(&self, name: &str) -> Result<Option<CrossRefDb>, RegistryError> {
        Ok(self.xrdbs.get(name).cloned())
    }

    fn upsert_xrdb(&mut self, xrdb: CrossRefDb) -> Result<(), RegistryError> {
        self.xrdbs.insert(xrdb.name.clone(), xrdb);
        Ok(())
    }

    fn xref_exists(
        &self,
        gene: GeneId,
        xrdb: &str,
        identifier: &str,
    ) -> Result<bool, RegistryError> {
        Ok(self
            .xrefs
            .iter()
            .any(|x| x.gene == gene && x.xrdb == xrdb && x.identifier == identifier))
    }

    fn insert_xref(&mut self, xref: CrossRef) -> Result<(), RegistryError> {
        self.xrefs.push(xref);
        Ok(())
    }

    fn xrefs_for_gene(&self, gene: GeneId) -> Result<Vec<CrossRef>, RegistryError> {
        Ok(self
            .xrefs
            .iter()
            .filter(|x| x.gene == gene)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    saved_at: String,
    next_gene_id: u64,
    organisms: Vec<Organism>,
    xrdbs: Vec<CrossRefDb>,
    genes: Vec<Gene>,
    xrefs: Vec<CrossRef>,
}

/// Store backend for the CLI: a [`MemoryStore`] loaded from and saved to a
/// single JSON snapshot file. Saves go through a temp file in the target
/// directory and a rename, so a crash mid-save leaves the old snapshot
/// intact.
#[derive(Debug)]
pub struct JsonStore {
    path: Utf8PathBuf,
    inner: MemoryStore,
}

impl JsonStore {
    pub fn open(path: &Utf8Path) -> Result<Self, RegistryError> {
        let inner = if path.as_std_path().exists() {
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|err| RegistryError::Filesystem(format!("read {path}: {err}")))?;
            let snapshot: Snapshot = serde_json::from_str(&content)
                .map_err(|err| RegistryError::Storage(format!("parse {path}: {err}")))?;
            let mut store = MemoryStore::new();
            store.next_gene_id = snapshot.next_gene_id;
            for organism in snapshot.organisms {
                store.organisms.insert(organism.taxonomy_id, organism);
            }
            for xrdb in snapshot.xrdbs {
                store.xrdbs.insert(xrdb.name.clone(), xrdb);
            }
            for gene in snapshot.genes {
                store.index_gene(&gene);
                store.genes.insert(gene.id, gene);
            }
            store.xrefs = snapshot.xrefs;
            store
        } else {
            MemoryStore::new()
        };
        Ok(Self {
            path: path.to_owned(),
            inner,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn save(&self) -> Result<(), RegistryError> {
        let mut genes: Vec<Gene> = self.inner.genes.values().cloned().collect();
        genes.sort_by_key(|gene| gene.id);
        let mut organisms: Vec<Organism> = self.inner.organisms.values().cloned().collect();
        organisms.sort_by_key(|organism| organism.taxonomy_id);
        let mut xrdbs: Vec<CrossRefDb> = self.inner.xrdbs.values().cloned().collect();
        xrdbs.sort_by(|a, b| a.name.cmp(&b.name));

        let snapshot = Snapshot {
            saved_at: chrono::Utc::now().to_rfc3339(),
            next_gene_id: self.inner.next_gene_id,
            organisms,
            xrdbs,
            genes,
            xrefs: self.inner.xrefs.clone(),
        };
        let content = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| RegistryError::Storage(err.to_string()))?;

        let parent = self.path.parent().unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("gene-registry")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), &content)
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl RecordStore for JsonStore {
    fn organism(&self, taxonomy_id: TaxonomyId) -> Result<Option<Organism>, RegistryError> {
        self.inner.organism(taxonomy_id)
    }

    fn upsert_organism(&mut self, organism: Organism) -> Result<(), RegistryError> {
        self.inner.upsert_organism(organism)
    }

    fn gene_by_entrez(
        &self,
        taxonomy_id: TaxonomyId,
        entrez_id: EntrezId,
    ) -> Result<Option<Gene>, RegistryError> {
        self.inner.gene_by_entrez(taxonomy_id, entrez_id)
    }

    fn gene_by_systematic(
        &self,
        taxonomy_id: TaxonomyId,
        systematic_id: &str,
    ) -> Result<Option<Gene>, RegistryError> {
        self.inner.gene_by_systematic(taxonomy_id, systematic_id)
    }

    fn find_gene_by_entrez(&self, entrez_id: EntrezId) -> Result<Option<Gene>, RegistryError> {
        self.inner.find_gene_by_entrez(entrez_id)
    }

    fn genes_for_organism(&self, taxonomy_id: TaxonomyId) -> Result<Vec<Gene>, RegistryError> {
        self.inner.genes_for_organism(taxonomy_id)
    }

    fn insert_gene(&mut self, gene: NewGene) -> Result<Gene, RegistryError> {
        self.inner.insert_gene(gene)
    }

    fn update_gene(&mut self, gene: &Gene) -> Result<(), RegistryError> {
        self.inner.update_gene(gene)
    }

    fn xrdb(&self, name: &str) -> Result<Option<CrossRefDb>, RegistryError> {
        self.inner.xrdb(name)
    }

    fn upsert_xrdb(&mut self, xrdb: CrossRefDb) -> Result<(), RegistryError> {
        self.inner.upsert_xrdb(xrdb)
    }

    fn xref_exists(
        &self,
        gene: GeneId,
        xrdb: &str,
        identifier: &str,
    ) -> Result<bool, RegistryError> {
        self.inner.xref_exists(gene, xrdb, identifier)
    }

    fn insert_xref(&mut self, xref: CrossRef) -> Result<(), RegistryError> {
        self.inner.insert_xref(xref)
    }

    fn xrefs_for_gene(&self, gene: GeneId) -> Result<Vec<CrossRef>, RegistryError> {
        self.inner.xrefs_for_gene(gene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_gene() -> NewGene {
        NewGene {
            taxonomy_id: TaxonomyId::new(9606),
            entrez_id: Some(EntrezId::new(100)),
            systematic_id: "ABC1".to_string(),
            symbol: "ABC1".to_string(),
            aliases: vec!["A1".to_string()],
            description: "test gene".to_string(),
            chromosome: "1".to_string(),
            type_of_gene: "protein-coding".to_string(),
            obsolete: false,
        }
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let mut store = MemoryStore::new();
        let first = store.insert_gene(sample_gene()).unwrap();
        let mut second = sample_gene();
        second.entrez_id = Some(EntrezId::new(101));
        let second = store.insert_gene(second).unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn lookup_by_natural_keys() {
        let mut store = MemoryStore::new();
        let gene = store.insert_gene(sample_gene()).unwrap();

        let by_entrez = store
            .gene_by_entrez(TaxonomyId::new(9606), EntrezId::new(100))
            .unwrap()
            .unwrap();
        assert_eq!(by_entrez.id, gene.id);

        let by_systematic = store
            .gene_by_systematic(TaxonomyId::new(9606), "ABC1")
            .unwrap()
            .unwrap();
        assert_eq!(by_systematic.id, gene.id);

        assert!(
            store
                .gene_by_entrez(TaxonomyId::new(10090), EntrezId::new(100))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn update_reindexes_changed_keys() {
        let mut store = MemoryStore::new();
        let mut gene = store.insert_gene(sample_gene()).unwrap();
        gene.entrez_id = Some(EntrezId::new(200));
        gene.systematic_id = "XYZ9".to_string();
        store.update_gene(&gene).unwrap();

        assert!(
            store
                .gene_by_entrez(TaxonomyId::new(9606), EntrezId::new(100))
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .gene_by_systematic(TaxonomyId::new(9606), "ABC1")
                .unwrap()
                .is_none()
        );
        let found = store
            .gene_by_systematic(TaxonomyId::new(9606), "XYZ9")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, gene.id);
        let found = store.find_gene_by_entrez(EntrezId::new(200)).unwrap().unwrap();
        assert_eq!(found.id, gene.id);
    }
}
