use assert_matches::assert_matches;

use gene_registry::domain::{CrossRefDb, EntrezId, Organism, TaxonomyId};
use gene_registry::error::RegistryError;
use gene_registry::registry::{GeneDraft, Registry, UpsertOutcome, XrdbOutcome};
use gene_registry::store::{MemoryStore, RecordStore};

const TAX: u32 = 9606;

fn registry() -> Registry<MemoryStore> {
    let mut store = MemoryStore::new();
    store
        .upsert_organism(Organism {
            taxonomy_id: TaxonomyId::new(TAX),
            name: "Homo sapiens".to_string(),
        })
        .unwrap();
    Registry::new(store)
}

fn draft(entrez: Option<i64>, systematic: &str, symbol: &str) -> GeneDraft {
    GeneDraft {
        entrez_id: entrez.map(EntrezId::new),
        systematic_id: systematic.to_string(),
        symbol: symbol.to_string(),
        aliases: Vec::new(),
        description: String::new(),
        chromosome: "1".to_string(),
        type_of_gene: "protein-coding".to_string(),
    }
}

#[test]
fn register_xrdb_reports_created_updated_unchanged() {
    let mut registry = registry();
    let make = |url: &str| CrossRefDb::new("Ensembl", url).unwrap();

    let outcome = registry
        .register_xrdb(make("http://www.ensembl.org/Gene/Summary?g=_REPL_"))
        .unwrap();
    assert_eq!(outcome, XrdbOutcome::Created);

    let outcome = registry
        .register_xrdb(make("http://www.ensembl.org/Gene/Summary?g=_REPL_"))
        .unwrap();
    assert_eq!(outcome, XrdbOutcome::Unchanged);

    let outcome = registry
        .register_xrdb(make("https://www.ensembl.org/id/_REPL_"))
        .unwrap();
    assert_eq!(outcome, XrdbOutcome::Updated);
    let stored = registry.require_xrdb("Ensembl").unwrap();
    assert_eq!(stored.url_template, "https://www.ensembl.org/id/_REPL_");
}

#[test]
fn upsert_without_entrez_keys_on_systematic_id() {
    let mut registry = registry();
    let tax = TaxonomyId::new(TAX);

    let (first, outcome) = registry
        .upsert_gene(tax, draft(None, "Y001", "sym-1"))
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Created);

    let (second, outcome) = registry
        .upsert_gene(tax, draft(None, "Y001", "sym-1b"))
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(second.id, first.id);
    assert_eq!(second.symbol, "sym-1b");
}

#[test]
fn upsert_with_entrez_ignores_systematic_changes_for_identity() {
    let mut registry = registry();
    let tax = TaxonomyId::new(TAX);

    let (first, _) = registry
        .upsert_gene(tax, draft(Some(100), "OLD-SYS", "ABC1"))
        .unwrap();
    let (second, outcome) = registry
        .upsert_gene(tax, draft(Some(100), "NEW-SYS", "ABC1"))
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(second.systematic_id, "NEW-SYS");
}

#[test]
fn same_draft_twice_is_unchanged() {
    let mut registry = registry();
    let tax = TaxonomyId::new(TAX);

    registry
        .upsert_gene(tax, draft(Some(100), "ABC1", "ABC1"))
        .unwrap();
    let (_, outcome) = registry
        .upsert_gene(tax, draft(Some(100), "ABC1", "ABC1"))
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Unchanged);
}

#[test]
fn upsert_deduplicates_aliases() {
    let mut registry = registry();
    let mut d = draft(Some(100), "ABC1", "ABC1");
    d.aliases = vec![
        "A1".to_string(),
        "B2".to_string(),
        "A1".to_string(),
        String::new(),
    ];
    let (gene, _) = registry.upsert_gene(TaxonomyId::new(TAX), d).unwrap();
    assert_eq!(gene.aliases, vec!["A1", "B2"]);
    assert_eq!(gene.aliases_joined(), "A1;B2");
}

#[test]
fn obsolete_flag_survives_refresh() {
    let mut registry = registry();
    let tax = TaxonomyId::new(TAX);

    let (gene, _) = registry
        .upsert_gene(tax, draft(Some(100), "ABC1", "ABC1"))
        .unwrap();
    assert!(registry.mark_obsolete(&gene).unwrap());

    let (gene, _) = registry
        .upsert_gene(tax, draft(Some(100), "ABC1", "ABC1-renamed"))
        .unwrap();
    assert!(gene.obsolete);
    assert_eq!(gene.symbol, "ABC1-renamed");
}

#[test]
fn mark_obsolete_is_idempotent() {
    let mut registry = registry();
    let (gene, _) = registry
        .upsert_gene(TaxonomyId::new(TAX), draft(Some(100), "ABC1", "ABC1"))
        .unwrap();
    assert!(registry.mark_obsolete(&gene).unwrap());
    let gene = registry
        .gene_by_entrez(TaxonomyId::new(TAX), EntrezId::new(100))
        .unwrap()
        .unwrap();
    assert!(!registry.mark_obsolete(&gene).unwrap());
}

#[test]
fn xref_triple_is_unique() {
    let mut registry = registry();
    registry
        .register_xrdb(CrossRefDb::new("Ensembl", "https://www.ensembl.org/id/_REPL_").unwrap())
        .unwrap();
    let (gene, _) = registry
        .upsert_gene(TaxonomyId::new(TAX), draft(Some(100), "ABC1", "ABC1"))
        .unwrap();

    assert!(registry.add_xref(gene.id, "Ensembl", "ENSG1").unwrap());
    assert!(!registry.add_xref(gene.id, "Ensembl", "ENSG1").unwrap());
    assert!(registry.add_xref(gene.id, "Ensembl", "ENSG2").unwrap());
    assert_eq!(registry.document_for(&gene).unwrap().xref_identifiers.len(), 2);
}

#[test]
fn add_xref_requires_registered_xrdb() {
    let mut registry = registry();
    let (gene, _) = registry
        .upsert_gene(TaxonomyId::new(TAX), draft(Some(100), "ABC1", "ABC1"))
        .unwrap();
    let err = registry.add_xref(gene.id, "Nowhere", "X1").unwrap_err();
    assert_matches!(err, RegistryError::MissingCrossRefDb(name) if name == "Nowhere");
}

#[test]
fn unknown_organism_lookup_fails() {
    let registry = registry();
    let err = registry.organism(TaxonomyId::new(4932)).unwrap_err();
    assert_matches!(err, RegistryError::OrganismNotFound(id) if id.value() == 4932);
}

#[test]
fn index_documents_flatten_genes_with_xrefs() {
    let mut registry = registry();
    registry
        .register_xrdb(CrossRefDb::new("Ensembl", "https://www.ensembl.org/id/_REPL_").unwrap())
        .unwrap();
    let tax = TaxonomyId::new(TAX);
    let mut d = draft(Some(100), "ABC1", "ABC1");
    d.aliases = vec!["A1".to_string(), "B2".to_string()];
    let (gene, _) = registry.upsert_gene(tax, d).unwrap();
    registry.add_xref(gene.id, "Ensembl", "ENSG1").unwrap();
    registry
        .upsert_gene(tax, draft(Some(101), "DEF2", "DEF2"))
        .unwrap();

    let documents = registry.index_documents(tax).unwrap();
    assert_eq!(documents.len(), 2);
    let first = &documents[0];
    assert_eq!(first.symbol, "ABC1");
    assert_eq!(first.aliases, "A1;B2");
    assert_eq!(first.xref_identifiers, vec!["ENSG1"]);
    assert!(documents[1].xref_identifiers.is_empty());
}
