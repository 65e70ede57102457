//! Schema codec: native column metadata to portable descriptors and back.
//!
//! [`encode_column`] classifies a reflected column through
//! [`native::classify`] and captures its type parameters, flags, default
//! and foreign keys in a [`ColumnDescriptor`]. [`decode_column`] reverses
//! that into a [`ColumnDef`] a store can create.
//!
//! For every supported type, `decode_column(encode_column(c))` keeps the
//! name, nullability, primary/unique flags and default unchanged, and the
//! logical type category matches.

pub mod logical;
pub mod native;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::schema::{Column, ColumnDef, ForeignKeyRef};
use crate::error::{Result, SnapshotError};

pub use logical::LogicalType;

/// Logical type with its parameters, as it appears in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSpec {
    /// Logical type name (see [`logical::TYPE_NAMES`]).
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,

    /// Element type name for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
}

impl TypeSpec {
    fn named(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            length: None,
            precision: None,
            scale: None,
            enum_values: None,
            item_type: None,
        }
    }
}

impl From<&LogicalType> for TypeSpec {
    fn from(ty: &LogicalType) -> Self {
        let mut spec = TypeSpec::named(ty.name());
        match ty {
            LogicalType::String { length } => spec.length = *length,
            LogicalType::Numeric { precision, scale } => {
                spec.precision = *precision;
                spec.scale = *scale;
            }
            LogicalType::Enum { values } => spec.enum_values = Some(values.clone()),
            LogicalType::Array { item } => spec.item_type = Some(item.name().to_string()),
            LogicalType::Integer
            | LogicalType::Float
            | LogicalType::Boolean
            | LogicalType::DateTime
            | LogicalType::Date
            | LogicalType::Text
            | LogicalType::LargeBinary => {}
        }
        spec
    }
}

/// Portable description of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,

    #[serde(rename = "type")]
    pub type_spec: TypeSpec,

    #[serde(default = "default_true", deserialize_with = "bool_or_null")]
    pub nullable: bool,

    #[serde(default, deserialize_with = "bool_or_null")]
    pub primary_key: bool,

    #[serde(default, deserialize_with = "bool_or_null")]
    pub unique: bool,

    /// Stringified default expression.
    #[serde(default, deserialize_with = "stringified")]
    pub default: Option<String>,

    /// Informational: an explicit index covers this column.
    #[serde(default, deserialize_with = "bool_or_null")]
    pub index: bool,

    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyRef>,
}

fn default_true() -> bool {
    true
}

fn bool_or_null<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(false))
}

fn stringified<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Encode a reflected column of `table` into a portable descriptor.
///
/// Fails with [`SnapshotError::UnsupportedType`] when the declared type is
/// outside the closed set.
pub fn encode_column(table: &str, column: &Column) -> Result<ColumnDescriptor> {
    let ty = native::classify(&column.data_type, column.enum_values.as_deref())
        .ok_or_else(|| SnapshotError::unsupported(table, &column.name, &column.data_type))?;

    Ok(ColumnDescriptor {
        name: column.name.clone(),
        type_spec: TypeSpec::from(&ty),
        nullable: column.is_nullable,
        primary_key: column.is_primary_key,
        unique: column.is_unique,
        default: column.default.clone(),
        index: column.is_indexed,
        foreign_keys: column.foreign_keys.clone(),
    })
}

/// Decode a descriptor of `table` back into a column definition.
pub fn decode_column(table: &str, descriptor: &ColumnDescriptor) -> Result<ColumnDef> {
    Ok(ColumnDef {
        name: descriptor.name.clone(),
        logical_type: decode_type(table, &descriptor.name, &descriptor.type_spec)?,
        nullable: descriptor.nullable,
        primary_key: descriptor.primary_key,
        unique: descriptor.unique,
        default: descriptor.default.clone(),
        foreign_keys: descriptor.foreign_keys.clone(),
    })
}

fn decode_type(table: &str, column: &str, spec: &TypeSpec) -> Result<LogicalType> {
    let ty = match spec.type_name.as_str() {
        "String" => LogicalType::String {
            length: spec.length,
        },
        "Numeric" => LogicalType::Numeric {
            precision: spec.precision,
            scale: spec.scale,
        },
        "Enum" => LogicalType::Enum {
            values: spec.enum_values.clone().unwrap_or_default(),
        },
        "ARRAY" | "Array" => {
            let item = spec
                .item_type
                .as_deref()
                .and_then(LogicalType::bare)
                .unwrap_or_else(LogicalType::generic_text);
            LogicalType::Array {
                item: Box::new(item),
            }
        }
        other => LogicalType::bare(other)
            .ok_or_else(|| SnapshotError::unsupported(table, column, other))?,
    };
    Ok(ty)
}
