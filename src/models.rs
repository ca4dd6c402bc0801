//! Data models for the Banquet query server.
//!
//! These structs match the JSON the Go query server writes. They use serde
//! for decoding the NDJSON records of a streamed result.

use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Schema entry for one result column.
///
/// Sent once per query in the header record, and by `GET /schema/{table}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// One dynamically typed table cell.
///
/// Decoding tries string, integer, float, boolean and null in that order.
/// Nested arrays and objects are not valid cells and decode to an empty
/// `Text` instead of failing the row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Integer or float, rendered right-aligned.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Cell::Integer(_) | Cell::Float(_))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Integer(v) => write!(f, "{}", v),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::Boolean(v) => write!(f, "{}", v),
            Cell::Null => Ok(()),
        }
    }
}

/// Largest magnitude at which every integral `f64` is still exact.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

struct CellVisitor;

impl<'de> Visitor<'de> for CellVisitor {
    type Value = Cell;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Cell, E> {
        Ok(Cell::Text(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Cell, E> {
        Ok(Cell::Text(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cell, E> {
        Ok(Cell::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cell, E> {
        // Out of i64 range: integer decoding fails, float is next in line.
        Ok(i64::try_from(v)
            .map(Cell::Integer)
            .unwrap_or(Cell::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Cell, E> {
        // Integral values such as `42.0` still decode as integers.
        if v.is_finite() && v.fract() == 0.0 && v.abs() <= MAX_EXACT_FLOAT_INT {
            Ok(Cell::Integer(v as i64))
        } else {
            Ok(Cell::Float(v))
        }
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Cell, E> {
        Ok(Cell::Boolean(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Cell, E> {
        Ok(Cell::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Cell, E> {
        Ok(Cell::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Cell, D::Error> {
        deserializer.deserialize_any(CellVisitor)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Cell, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Cell::Text(String::new()))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Cell, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(Cell::Text(String::new()))
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CellVisitor)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Integer(v) => serializer.serialize_i64(*v),
            Cell::Float(v) => serializer.serialize_f64(*v),
            Cell::Boolean(v) => serializer.serialize_bool(*v),
            Cell::Null => serializer.serialize_unit(),
        }
    }
}

/// One result row, ordered like the header's columns.
pub type Row = Vec<Cell>;

/// One NDJSON record of a query response.
///
/// Every field is optional. The server writes absent fields as `null`,
/// which serde maps to `None` here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub columns: Option<Vec<ColumnInfo>>,
    #[serde(default)]
    pub rows: Option<Vec<Row>>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `POST /query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub banquet_url: String,
}

impl QueryRequest {
    pub fn new(banquet_url: impl Into<String>) -> Self {
        Self {
            banquet_url: banquet_url.into(),
        }
    }
}

/// Body of `GET /schema/{table}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchemaResponse {
    #[serde(default)]
    pub columns: Option<Vec<ColumnInfo>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Table name the server falls back to when the URL names none.
pub const DEFAULT_TABLE: &str = "tb0";

/// Summary of a Banquet URL for the status bar.
///
/// `/data/Index.sqlite/tb0?limit=100` splits into dataset
/// `/data/Index.sqlite`, table `tb0` and query `limit=100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfo {
    pub dataset_path: String,
    pub table: String,
    pub query: Option<String>,
}

impl QueryInfo {
    pub fn parse(banquet_url: &str) -> Self {
        let (path, query) = match banquet_url.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (banquet_url, None),
        };

        let components: Vec<&str> = path.split('/').collect();
        let dataset_idx = components.iter().position(|c| c.ends_with(".sqlite"));

        let (dataset_path, table) = match dataset_idx {
            Some(idx) => (
                components[..=idx].join("/"),
                components
                    .get(idx + 1)
                    .filter(|t| !t.is_empty())
                    .map(|t| t.to_string()),
            ),
            None => (path.to_string(), None),
        };

        Self {
            dataset_path,
            table: table.unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            query: query.filter(|q| !q.is_empty()),
        }
    }
}
