//! Classification of declared native column types.

use super::logical::LogicalType;

/// Map a declared native type (e.g. `VARCHAR(50)`, `NUMERIC(10, 2)`,
/// `INTEGER ARRAY`) onto the closed logical set.
///
/// `enum_values` carries members recovered from the store's catalog; when
/// present the column is an enumeration regardless of its storage type.
/// Returns `None` for anything outside the supported set, including an
/// empty declaration.
pub fn classify(data_type: &str, enum_values: Option<&[String]>) -> Option<LogicalType> {
    if let Some(values) = enum_values {
        return Some(LogicalType::Enum {
            values: values.to_vec(),
        });
    }

    let declared = data_type.trim().to_lowercase();
    if declared.is_empty() {
        return None;
    }

    if let Some(element) = array_element(&declared) {
        let item = classify(element, None)?;
        return Some(LogicalType::Array {
            item: Box::new(item),
        });
    }

    let (base, params) = split_params(&declared);
    let ty = match base.as_str() {
        // Integer types
        "integer" | "int" | "tinyint" | "smallint" | "mediumint" | "bigint" | "int2" | "int4"
        | "int8" | "unsigned big int" | "serial" | "bigserial" | "smallserial" => {
            LogicalType::Integer
        }

        // Character types
        "varchar" | "character varying" | "varying character" | "char" | "character"
        | "nchar" | "native character" | "nvarchar" | "bpchar" | "string" => {
            LogicalType::String {
                length: params.first().copied(),
            }
        }
        "text" | "clob" | "ntext" | "longtext" | "mediumtext" | "tinytext" => LogicalType::Text,

        // Floating point
        "float" | "real" | "double" | "double precision" | "float4" | "float8" => {
            LogicalType::Float
        }

        // Fixed point
        "numeric" | "decimal" | "money" => LogicalType::Numeric {
            precision: params.first().copied(),
            scale: params.get(1).copied(),
        },

        "boolean" | "bool" | "bit" => LogicalType::Boolean,

        // Date/time types
        "datetime" | "datetime2" | "smalldatetime" | "timestamp" | "timestamp without time zone" => {
            LogicalType::DateTime
        }
        "date" => LogicalType::Date,

        // Binary types
        "blob" | "bytea" | "binary" | "varbinary" | "longblob" | "mediumblob" | "image" => {
            LogicalType::LargeBinary
        }

        _ => return None,
    };
    Some(ty)
}

/// Element part of an array declaration, if the declaration is one.
fn array_element(declared: &str) -> Option<&str> {
    if let Some(element) = declared.strip_suffix("[]") {
        return Some(element.trim_end());
    }
    if let Some(element) = declared.strip_suffix(" array") {
        return Some(element.trim_end());
    }
    // PostgreSQL internal array names such as `_int4`
    declared.strip_prefix('_').filter(|e| !e.is_empty())
}

/// Split `name(a, b)` into the normalized name and its numeric parameters.
fn split_params(declared: &str) -> (String, Vec<u32>) {
    let (name, rest) = match declared.find('(') {
        Some(open) => (&declared[..open], &declared[open + 1..]),
        None => (declared, ""),
    };
    let params = rest
        .split(')')
        .next()
        .unwrap_or("")
        .split(',')
        .filter_map(|p| p.trim().parse::<u32>().ok())
        .collect();
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    (name, params)
}
