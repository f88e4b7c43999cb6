//! Canonical gene registry with an idempotent reconciliation pipeline.
//!
//! The crate ingests externally-sourced gene annotation files (NCBI
//! gene_info and gene_history, UniProt id-mapping, WormBase xref dumps)
//! and merges them into one registry keyed by organism taxonomy. Parsing
//! is column-configurable ([`parser`]), each source has its own adapter
//! ([`geneinfo`], [`uniprot`], [`wormbase`], [`history`]), and the shared
//! merge rules live in [`registry`]. Persistence is a pluggable
//! [`store::RecordStore`]; callers construct a store, wrap it in a
//! [`registry::Registry`] and hand it to the adapter functions.

pub mod domain;
pub mod error;
pub mod geneinfo;
pub mod history;
pub mod output;
pub mod parser;
pub mod registry;
pub mod store;
pub mod uniprot;
pub mod wormbase;
