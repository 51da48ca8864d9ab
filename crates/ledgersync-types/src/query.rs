//! Primary-store query descriptions and their in-memory evaluation.
//!
//! The evaluation helpers here are the single definition of filter and sort
//! semantics. The document store applies them when it can serve a query and
//! the fallback executor applies them when it cannot, so both paths agree.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::value::{Document, NativeValue};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascending,
    Descending,
}

/// Explicit sort on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// `field == value` filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualityFilter {
    pub field: String,
    pub value: NativeValue,
}

/// One end of a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: NativeValue,
    pub inclusive: bool,
}

/// `lower <= field <= upper` filter; either end may be open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub field: String,
    #[serde(default)]
    pub lower: Option<Bound>,
    #[serde(default)]
    pub upper: Option<Bound>,
}

impl RangeFilter {
    /// Inclusive span `[from, to]`.
    #[must_use]
    pub fn between(field: impl Into<String>, from: NativeValue, to: NativeValue) -> Self {
        Self {
            field: field.into(),
            lower: Some(Bound {
                value: from,
                inclusive: true,
            }),
            upper: Some(Bound {
                value: to,
                inclusive: true,
            }),
        }
    }

    /// Whether `doc` falls within the range.
    ///
    /// A document lacking the field, or holding a value of a different kind
    /// than the bounds, never matches.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(value) = doc.get(&self.field) else {
            return false;
        };
        if let Some(lower) = &self.lower {
            if !value.same_kind(&lower.value) {
                return false;
            }
            match value.sort_cmp(&lower.value) {
                Ordering::Less => return false,
                Ordering::Equal if !lower.inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            if !value.same_kind(&upper.value) {
                return false;
            }
            match value.sort_cmp(&upper.value) {
                Ordering::Greater => return false,
                Ordering::Equal if !upper.inclusive => return false,
                _ => {}
            }
        }
        true
    }
}

/// A query against one collection of the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    #[serde(default)]
    pub equals: Vec<EqualityFilter>,
    #[serde(default)]
    pub range: Option<RangeFilter>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            equals: Vec::new(),
            range: None,
            order_by: None,
            limit: None,
        }
    }

    /// Distinct fields referenced by filters and sort.
    #[must_use]
    pub fn referenced_fields(&self) -> BTreeSet<&str> {
        let mut fields: BTreeSet<&str> = self.equals.iter().map(|f| f.field.as_str()).collect();
        if let Some(range) = &self.range {
            fields.insert(&range.field);
        }
        if let Some(order) = &self.order_by {
            fields.insert(&order.field);
        }
        fields
    }

    /// Whether serving this query needs a composite index.
    ///
    /// Pure equality queries and range/sort queries over a single field are
    /// served by automatic single-field indexes.
    #[must_use]
    pub fn requires_composite_index(&self) -> bool {
        let ranged_or_sorted = self.range.is_some() || self.order_by.is_some();
        ranged_or_sorted && self.referenced_fields().len() > 1
    }

    /// Whether `doc` satisfies every equality filter and the range filter.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        matches_equality(&self.equals, doc) && self.range.as_ref().map_or(true, |r| r.matches(doc))
    }
}

/// Whether `doc` satisfies every filter in `equals`.
#[must_use]
pub fn matches_equality(equals: &[EqualityFilter], doc: &Document) -> bool {
    equals.iter().all(|filter| {
        doc.get(&filter.field)
            .is_some_and(|value| value.filter_eq(&filter.value))
    })
}

/// Compare two documents by `order`.
///
/// Documents missing the sort field (or holding null) order after every
/// document that has a value, in either direction. Ties break on the
/// document identifier so the order is total and reproducible.
#[must_use]
pub fn compare_documents(a: &Document, b: &Document, order: &OrderBy) -> Ordering {
    fn present<'d>(doc: &'d Document, field: &str) -> Option<&'d NativeValue> {
        doc.get(field).filter(|v| !matches!(v, NativeValue::Null))
    }
    let by_field = match (present(a, &order.field), present(b, &order.field)) {
        (Some(x), Some(y)) => match order.direction {
            Direction::Ascending => x.sort_cmp(y),
            Direction::Descending => y.sort_cmp(x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_field.then_with(|| a.id.cmp(&b.id))
}

/// Sort documents in place by `order`, or by identifier when unsorted.
pub fn sort_documents(docs: &mut [Document], order: Option<&OrderBy>) {
    match order {
        Some(order) => docs.sort_by(|a, b| compare_documents(a, b, order)),
        None => docs.sort_by(|a, b| a.id.cmp(&b.id)),
    }
}
