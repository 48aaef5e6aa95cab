use std::sync::Arc;

use async_trait::async_trait;
use mongex_common::error::{MongexError, Result};
use mongodb::bson::{Bson, Document, Regex as BsonRegex, doc};
use regex::{Regex, RegexBuilder};

#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn run_command(&self, database: &str, command: Document) -> Result<Document>;
    async fn list_database_names(&self, filter: &DatabaseFilter) -> Result<Vec<String>>;
    async fn list_collection_names(
        &self,
        database: &str,
        filter: &CollectionFilter,
    ) -> Result<Vec<String>>;
    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>>;
    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>>;
    async fn ping(&self) -> Result<()>;
    async fn shutdown(&self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn AdminClient>>;
}

/// Database name filter: every `exclude` entry must differ from the name
/// (exact match), and when `include` is not empty one of its entries must
/// equal the name ignoring case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseFilter {
    pub exclude: Vec<String>,
    pub include: Vec<String>,
}

impl DatabaseFilter {
    pub fn matches(&self, name: &str) -> bool {
        if self.exclude.iter().any(|excluded| excluded == name) {
            return false;
        }

        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|included| included.eq_ignore_ascii_case(name))
    }

    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();

        if !self.exclude.is_empty() {
            let expressions: Vec<Bson> = self
                .exclude
                .iter()
                .map(|name| Bson::Document(doc! { "name": { "$ne": name.as_str() } }))
                .collect();
            filter.insert("$and", expressions);
        }

        if !self.include.is_empty() {
            let expressions: Vec<Bson> = self
                .include
                .iter()
                .map(|name| {
                    let pattern = BsonRegex {
                        pattern: format!("^{}$", regex::escape(name)),
                        options: "i".to_string(),
                    };
                    Bson::Document(doc! { "name": pattern })
                })
                .collect();
            filter.insert("$or", expressions);
        }

        filter
    }
}

/// Collection name filter: unanchored, case-insensitive patterns OR-combined
/// (empty means every name), optionally restricted to physical collections.
#[derive(Debug, Clone, Default)]
pub struct CollectionFilter {
    patterns: Vec<String>,
    compiled: Vec<Regex>,
    physical_only: bool,
}

impl CollectionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn physical_only() -> Self {
        Self {
            physical_only: true,
            ..Self::default()
        }
    }

    pub fn with_patterns(patterns: Vec<String>) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|err| {
                        MongexError::InvalidArgument(format!(
                            "invalid collection pattern {pattern:?}: {err}"
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            compiled,
            physical_only: false,
        })
    }

    pub fn matches(&self, name: &str, is_view: bool) -> bool {
        if self.physical_only && is_view {
            return false;
        }

        self.compiled.is_empty() || self.compiled.iter().any(|regex| regex.is_match(name))
    }

    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();

        if !self.patterns.is_empty() {
            let expressions: Vec<Bson> = self
                .patterns
                .iter()
                .map(|pattern| {
                    let pattern = BsonRegex {
                        pattern: pattern.clone(),
                        options: "i".to_string(),
                    };
                    Bson::Document(doc! { "name": pattern })
                })
                .collect();
            filter.insert("$or", expressions);
        }

        if self.physical_only {
            filter.insert("type", "collection");
        }

        filter
    }
}
