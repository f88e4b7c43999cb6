use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Placeholder token in a cross-reference database URL template. The display
/// layer substitutes it with an external identifier.
pub const URL_PLACEHOLDER: &str = "_REPL_";

/// NCBI taxonomy id of an organism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxonomyId(u32);

impl TaxonomyId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaxonomyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxonomyId {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| RegistryError::Configuration(format!("invalid taxonomy id: {value:?}")))
    }
}

/// NCBI Entrez gene id, the source-system primary identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntrezId(i64);

impl EntrezId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntrezId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntrezId {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| RegistryError::Configuration(format!("invalid entrez id: {value:?}")))
    }
}

/// Internal surrogate gene id, assigned by the record store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneId(u64);

impl GeneId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GeneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External collaborator entity. Looked up by taxonomy id, never created by
/// the reconciliation core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organism {
    pub taxonomy_id: TaxonomyId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gene {
    pub id: GeneId,
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

impl Gene {
    /// Alias storage form: ordered set, semicolon-joined.
    pub fn aliases_joined(&self) -> String {
        self.aliases.join(";")
    }
}

/// A named external identifier namespace (xrdb).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossRefDb {
    pub name: String,
    pub url_template: String,
}

impl CrossRefDb {
    pub fn new(name: &str, url_template: &str) -> Result<Self, RegistryError> {
        let name = name.trim();
        let url_template = url_template.trim();
        if name.is_empty() {
            return Err(RegistryError::Configuration(
                "cross-reference database name must not be blank".to_string(),
            ));
        }
        if !url_template.contains(URL_PLACEHOLDER) {
            return Err(RegistryError::Configuration(format!(
                "url template {url_template:?} does not contain the {URL_PLACEHOLDER} placeholder"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            url_template: url_template.to_string(),
        })
    }

    /// Substitute an external identifier into the URL template.
    pub fn url_for(&self, identifier: &str) -> String {
        self.url_template.replace(URL_PLACEHOLDER, identifier)
    }
}

/// A single external identifier tied to one gene under one xrdb. The
/// (gene, xrdb, identifier) triple is unique; identifiers are opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossRef {
    pub gene: GeneId,
    pub xrdb: String,
    pub identifier: String,
}

/// Deduplicate while preserving first-seen order. Comparison is
/// case-sensitive.
pub fn dedup_preserve_order(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| !value.is_empty() && seen.insert(value.clone()))
        .collect()
}
