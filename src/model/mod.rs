use serde::{Deserialize, Serialize};

/// Location hint used when the caller does not provide one.
pub const DEFAULT_LOCATION: &str = "Western Massachusetts";

/// Represents a scalar cell value in a normalized record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ScalarValue {
    /// Plain string literal.
    String(String),
    /// Floating point number literal.
    Number(f64),
    /// Boolean literal.
    Boolean(bool),
    /// Missing value.
    Null,
}

impl ScalarValue {
    /// Returns the numeric value, if any. Used by ranking and summary
    /// statistics; strings are never coerced.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(value) if !value.is_nan() => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Renders the value the way it appears in text reports.
    pub fn display(&self) -> String {
        match self {
            ScalarValue::String(value) => value.clone(),
            ScalarValue::Number(value) => value.to_string(),
            ScalarValue::Boolean(value) => value.to_string(),
            ScalarValue::Null => String::new(),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Number(value)
    }
}

impl From<u64> for ScalarValue {
    fn from(value: u64) -> Self {
        ScalarValue::Number(value as f64)
    }
}

impl From<u32> for ScalarValue {
    fn from(value: u32) -> Self {
        ScalarValue::Number(f64::from(value))
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Number(value as f64)
    }
}

impl From<usize> for ScalarValue {
    fn from(value: usize) -> Self {
        ScalarValue::Number(value as f64)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ScalarValue::Null)
    }
}

/// One normalized flat row. Field order is the insertion order and becomes
/// the column order when no explicit column list is supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, ScalarValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Inserts or replaces a field value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<ScalarValue>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&ScalarValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(ScalarValue::as_number)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Returns true when both records carry exactly the same field names in
    /// the same order.
    pub fn same_schema(&self, other: &Record) -> bool {
        self.fields.len() == other.fields.len() && self.field_names().eq(other.field_names())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Aggregate metadata accompanying a record sequence.
///
/// Built once via [`FromIterator`] after all pages are fetched; there is no
/// mutating API afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    entries: Vec<(String, ScalarValue)>,
}

impl Summary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: &str) -> Option<&ScalarValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<ScalarValue>> FromIterator<(K, V)> for Summary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Transient request parameters for one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Business name, business type, or keyword depending on the tool.
    pub subject: String,
    pub location: String,
    /// Search radius in metres.
    pub radius: Option<u32>,
}

impl Query {
    pub fn new(subject: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            location: location.into(),
            radius: None,
        }
    }

    pub fn with_radius(mut self, radius: u32) -> Self {
        self.radius = Some(radius);
        self
    }
}

/// The record sequence and its summary, travelling together as explicit
/// siblings, plus the sheet name and column list used when exporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub sheet_name: String,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
    pub summary: Summary,
}

impl Dataset {
    pub fn new(sheet_name: impl Into<String>, columns: &[&str], records: Vec<Record>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            columns: columns.iter().map(|column| column.to_string()).collect(),
            records,
            summary: Summary::empty(),
        }
    }

    pub fn with_summary(mut self, summary: Summary) -> Self {
        self.summary = summary;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
