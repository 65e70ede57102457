//! The closed set of portable column types.

use std::fmt;

/// Portable column type carried in snapshot documents.
///
/// Every store driver renders each variant through an exhaustive `match`,
/// so adding a variant is a compile error until every dialect handles it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Integer,
    /// Bounded or unbounded character data.
    String { length: Option<u32> },
    Float,
    Boolean,
    /// Timestamp without time zone.
    DateTime,
    Date,
    Text,
    /// Fixed-point number.
    Numeric {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    LargeBinary,
    /// Enumeration over the listed members, in declaration order.
    Enum { values: Vec<String> },
    /// Homogeneous array of the element type.
    Array { item: Box<LogicalType> },
}

/// Wire names, in the order they are documented.
pub const TYPE_NAMES: &[&str] = &[
    "Integer",
    "String",
    "Float",
    "Boolean",
    "DateTime",
    "Date",
    "Text",
    "Numeric",
    "LargeBinary",
    "Enum",
    "ARRAY",
];

impl LogicalType {
    /// Name used for this type in the snapshot document.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalType::Integer => "Integer",
            LogicalType::String { .. } => "String",
            LogicalType::Float => "Float",
            LogicalType::Boolean => "Boolean",
            LogicalType::DateTime => "DateTime",
            LogicalType::Date => "Date",
            LogicalType::Text => "Text",
            LogicalType::Numeric { .. } => "Numeric",
            LogicalType::LargeBinary => "LargeBinary",
            LogicalType::Enum { .. } => "Enum",
            LogicalType::Array { .. } => "ARRAY",
        }
    }

    /// Build a type from its wire name with no parameters.
    ///
    /// Used for array element types, which travel as a bare name.
    /// Returns `None` for names outside the closed set.
    pub fn bare(name: &str) -> Option<LogicalType> {
        let ty = match name {
            "Integer" => LogicalType::Integer,
            "String" => LogicalType::String { length: None },
            "Float" => LogicalType::Float,
            "Boolean" => LogicalType::Boolean,
            "DateTime" => LogicalType::DateTime,
            "Date" => LogicalType::Date,
            "Text" => LogicalType::Text,
            "Numeric" => LogicalType::Numeric {
                precision: None,
                scale: None,
            },
            "LargeBinary" => LogicalType::LargeBinary,
            "Enum" => LogicalType::Enum { values: Vec::new() },
            "ARRAY" | "Array" => LogicalType::Array {
                item: Box::new(LogicalType::generic_text()),
            },
            _ => return None,
        };
        Some(ty)
    }

    /// Fallback element type for arrays whose element name is unknown.
    pub fn generic_text() -> LogicalType {
        LogicalType::String { length: None }
    }

    /// True for the two types the value coercer repairs on restore.
    pub fn is_temporal(&self) -> bool {
        matches!(self, LogicalType::DateTime | LogicalType::Date)
    }

    /// True if both types belong to the same category, ignoring parameters.
    pub fn same_category(&self, other: &LogicalType) -> bool {
        match (self, other) {
            (LogicalType::Array { item: a }, LogicalType::Array { item: b }) => a.same_category(b),
            _ => self.name() == other.name(),
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::String { length: Some(n) } => write!(f, "String({})", n),
            LogicalType::Numeric {
                precision: Some(p),
                scale,
            } => write!(f, "Numeric({}, {})", p, scale.unwrap_or(0)),
            LogicalType::Enum { values } => write!(f, "Enum({})", values.join(", ")),
            LogicalType::Array { item } => write!(f, "ARRAY({})", item),
            other => f.write_str(other.name()),
        }
    }
}
