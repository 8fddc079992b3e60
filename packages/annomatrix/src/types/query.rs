use super::{Field, Label};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// Predicate selecting `X` columns through an annotation column, e.g.
/// `var.gene_id == "TP53"`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WhereQuery {
    pub field: Field,
    pub column: Label,
    pub value: SmolStr,
}

/// What a fetch asks for within one field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Query {
    Column { label: Label },
    Columns { labels: Vec<Label> },
    Where(WhereQuery),
}

impl Query {
    pub fn column(label: impl Into<Label>) -> Self {
        Query::Column {
            label: label.into(),
        }
    }

    pub fn columns<I, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        Query::Columns {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn where_eq(field: Field, column: impl Into<Label>, value: impl Into<SmolStr>) -> Self {
        Query::Where(WhereQuery {
            field,
            column: column.into(),
            value: value.into(),
        })
    }

    /// Labels the query names explicitly. `None` for predicate queries,
    /// whose labels are only known once resolved.
    pub fn explicit_labels(&self) -> Option<Vec<Label>> {
        match self {
            Query::Column { label } => Some(vec![label.clone()]),
            Query::Columns { labels } => Some(labels.clone()),
            Query::Where(_) => None,
        }
    }
}

impl From<&str> for Query {
    fn from(label: &str) -> Self {
        Query::column(label)
    }
}

impl From<Label> for Query {
    fn from(label: Label) -> Self {
        Query::Column { label }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Column { label } => f.write_str(label),
            Query::Columns { labels } => write!(f, "[{}]", labels.join(",")),
            Query::Where(w) => write!(f, "{}.{}=={}", w.field, w.column, w.value),
        }
    }
}
