//! Query specifications for the document store.
//!
//! A [`QuerySpec`] is a plain value. Every builder call consumes the spec and
//! returns the extended one, so two chains started from clones of the same
//! base never see each other's filters:
//!
//! ```
//! use airjoin::docstore::QuerySpec;
//!
//! let base = QuerySpec::new().filter_by("tenant", "urbanbetter");
//! let d1 = base.clone().filter_by("device", "D1");
//! let d2 = base.clone().in_filter_by("device", ["D2", "D3"]);
//! assert_eq!(base.filter_count(), 1);
//! assert_eq!(d1.filter_count(), 2);
//! assert_eq!(d2.filter_count(), 2);
//! ```

use std::cmp::Ordering;

use serde_json::{json, Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
}

impl Condition {
    fn field(&self) -> &str {
        match self {
            Condition::Eq { field, .. } | Condition::In { field, .. } => field,
        }
    }

    fn render(&self) -> Value {
        let mut clause = Map::new();
        match self {
            Condition::Eq { field, value } => {
                clause.insert(field.clone(), value.clone());
            }
            Condition::In { field, values } => {
                clause.insert(field.clone(), json!({ "$in": values }));
            }
        }
        Value::Object(clause)
    }

    fn matches(&self, doc: &Value) -> bool {
        match self {
            Condition::Eq { field, value } => lookup(doc, field) == Some(value),
            Condition::In { field, values } => lookup(doc, field)
                .map(|found| values.contains(found))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    filters: Vec<Condition>,
    sort: Vec<(String, SortDirection)>,
    projection: Option<Vec<String>>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field` to equal `value`.
    pub fn filter_by(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Requires `field` to equal one of `values`.
    pub fn in_filter_by<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filters.push(Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }

    /// Restricts returned documents to `fields`.
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn validate(&self) -> Result<()> {
        for condition in &self.filters {
            if condition.field().is_empty() {
                return Err(Error::InvalidQuery("filter field name is empty".to_string()));
            }
            if let Condition::In { field, values } = condition {
                if values.is_empty() {
                    return Err(Error::InvalidQuery(format!("empty $in list for {field}")));
                }
            }
        }
        if self.sort.iter().any(|(field, _)| field.is_empty()) {
            return Err(Error::InvalidQuery("sort key cannot be empty".to_string()));
        }
        if let Some(fields) = &self.projection {
            if fields.iter().any(|f| f.is_empty()) {
                return Err(Error::InvalidQuery("projection field is empty".to_string()));
            }
        }
        Ok(())
    }

    /// Renders the Mongo-style filter document. No filters render as `{}`.
    pub fn to_filter(&self) -> Result<Value> {
        self.validate()?;
        if self.filters.is_empty() {
            return Ok(json!({}));
        }
        let clauses: Vec<Value> = self.filters.iter().map(Condition::render).collect();
        Ok(json!({ "$and": clauses }))
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|condition| condition.matches(doc))
    }

    /// Filters, sorts and projects `docs` in memory.
    pub fn apply<'a, I>(&self, docs: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        self.validate()?;
        let mut selected: Vec<&Value> = docs.into_iter().filter(|d| self.matches(d)).collect();
        if !self.sort.is_empty() {
            selected.sort_by(|a, b| self.compare(a, b));
        }
        Ok(selected.into_iter().map(|doc| self.shape(doc)).collect())
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (field, direction) in &self.sort {
            let ordering = compare_values(lookup(a, field), lookup(b, field));
            let ordering = match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn shape(&self, doc: &Value) -> Value {
        let Some(fields) = &self.projection else {
            return doc.clone();
        };
        let mut out = Map::new();
        for field in fields {
            if let Some(value) = doc.get(field) {
                out.insert(field.clone(), value.clone());
            }
        }
        Value::Object(out)
    }
}

/// Resolves a dotted path such as `pollutants.pm25.value`.
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, part| node.get(part))
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
