//! Resilient range-query executor.
//!
//! A range query with equality filters and an explicit sort needs a
//! composite index in the primary store. When the store rejects it for a
//! missing index, the executor falls back to a range-only query and applies
//! the equality filters, sort, and limit in memory, returning the same
//! records the composite query would have. The index-creation hint from the
//! rejection is attached to the result.

use std::sync::LazyLock;

use ledgersync_types::entity::EntityType;
use ledgersync_types::error::{StoreError, StoreErrorKind};
use ledgersync_types::query::{matches_equality, sort_documents, EqualityFilter, OrderBy, Query, RangeFilter};
use ledgersync_types::value::{Document, Record};
use regex::Regex;
use serde::Serialize;

use crate::errors::SyncError;
use crate::normalize::Normalizer;
use crate::primary::DocumentStore;
use crate::registry::Registry;

static INDEX_SIGNATURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)requires\s+(a\s+|an\s+)?(composite\s+)?index").expect("valid regex"));

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("valid regex"));

/// Configuration action that would let the store serve a query directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Remediation {
    pub message: String,
    /// Index-creation link, when the store supplied one.
    pub url: Option<String>,
}

/// How a query was ultimately served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPath {
    Composite,
    RangeOnly,
}

/// Records returned by [`execute_range_query`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub records: Vec<Record>,
    pub path: QueryPath,
    /// Present only when the fallback path was taken.
    pub remediation: Option<Remediation>,
}

/// Range query over one entity's collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub entity: EntityType,
    pub equals: Vec<EqualityFilter>,
    pub range: RangeFilter,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl RangeQuery {
    #[must_use]
    pub fn new(entity: EntityType, range: RangeFilter) -> Self {
        Self {
            entity,
            equals: Vec::new(),
            range,
            order_by: None,
            limit: None,
        }
    }

    fn composite(&self, collection: &str) -> Query {
        Query {
            collection: collection.to_string(),
            equals: self.equals.clone(),
            range: Some(self.range.clone()),
            order_by: self.order_by.clone(),
            limit: self.limit,
        }
    }

    /// Single-field query every store can serve without a composite index.
    fn range_only(&self, collection: &str) -> Query {
        Query {
            collection: collection.to_string(),
            equals: Vec::new(),
            range: Some(self.range.clone()),
            order_by: None,
            limit: None,
        }
    }
}

/// Recognize an index-requirement rejection and pull out its remediation.
///
/// Returns `None` for any other failure.
#[must_use]
pub fn detect_index_requirement(err: &StoreError) -> Option<Remediation> {
    if err.kind != StoreErrorKind::FailedPrecondition || !INDEX_SIGNATURE_RE.is_match(&err.message) {
        return None;
    }
    let url = URL_RE
        .find(&err.message)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')']).to_string());
    Some(Remediation {
        message: err.message.clone(),
        url,
    })
}

enum State {
    Composite,
    RangeOnly(Remediation),
    Failed(StoreError),
}

/// Run `query`, falling back to in-memory filtering on a missing index.
///
/// # Errors
///
/// Returns [`SyncError::Store`] when the composite query fails for a
/// reason other than a missing index, or when the range-only query fails.
pub async fn execute_range_query<S: DocumentStore>(
    store: &S,
    registry: &Registry,
    query: &RangeQuery,
) -> Result<QueryOutcome, SyncError> {
    let collection = registry.collection_of(query.entity);
    let mut state = State::Composite;

    let (docs, path, remediation) = loop {
        state = match state {
            State::Composite => match store.query(&query.composite(collection)).await {
                Ok(docs) => break (docs, QueryPath::Composite, None),
                Err(err) => match detect_index_requirement(&err) {
                    Some(remediation) => {
                        tracing::warn!(
                            entity = %query.entity,
                            url = remediation.url.as_deref().unwrap_or("-"),
                            "Composite index missing, falling back to range-only query"
                        );
                        State::RangeOnly(remediation)
                    }
                    None => State::Failed(err),
                },
            },
            State::RangeOnly(remediation) => match store.query(&query.range_only(collection)).await {
                Ok(docs) => {
                    let docs = refine(docs, query);
                    break (docs, QueryPath::RangeOnly, Some(remediation));
                }
                Err(err) => State::Failed(err),
            },
            State::Failed(err) => return Err(err.into()),
        };
    };

    let normalizer = Normalizer::for_entity(registry, query.entity);
    let primary_key = registry.primary_key_of(query.entity);
    Ok(QueryOutcome {
        records: docs
            .iter()
            .map(|doc| normalizer.document_to_record(doc, primary_key))
            .collect(),
        path,
        remediation,
    })
}

/// Apply what the range-only query left out.
fn refine(docs: Vec<Document>, query: &RangeQuery) -> Vec<Document> {
    let mut docs: Vec<Document> = docs
        .into_iter()
        .filter(|doc| matches_equality(&query.equals, doc) && query.range.matches(doc))
        .collect();
    sort_documents(&mut docs, query.order_by.as_ref());
    if let Some(limit) = query.limit {
        docs.truncate(limit);
    }
    docs
}
