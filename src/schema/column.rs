use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::ID_COLUMN;

/// Declared base type of a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Id,
    Boolean,
    Varchar(usize),
    Text,
    Integer,
    Decimal,
    Money,
    DateTime,
    Json,
    Array(Box<ColumnType>),
}

impl ColumnType {
    /// Parse a type name such as `integer`, `varchar(100)` or `[]text`
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim().to_lowercase();

        if let Some(element) = name.strip_prefix("[]") {
            let element = ColumnType::parse(element)?;
            if element.is_array() {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("nested array type '{}' is not supported", name),
                ));
            }
            return Ok(ColumnType::Array(Box::new(element)));
        }

        if let Some(rest) = name.strip_prefix("varchar") {
            let size = rest
                .trim()
                .strip_prefix('(')
                .and_then(|s| s.strip_suffix(')'))
                .and_then(|s| s.trim().parse::<usize>().ok());
            return match size {
                Some(size) if size > 0 => Ok(ColumnType::Varchar(size)),
                _ if rest.is_empty() => Ok(ColumnType::Varchar(255)),
                _ => Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("malformed varchar type '{}'", name),
                )),
            };
        }

        match name.as_str() {
            "id" => Ok(ColumnType::Id),
            "bool" | "boolean" => Ok(ColumnType::Boolean),
            "text" | "string" => Ok(ColumnType::Text),
            "int" | "integer" => Ok(ColumnType::Integer),
            "decimal" | "float" => Ok(ColumnType::Decimal),
            "money" => Ok(ColumnType::Money),
            "datetime" => Ok(ColumnType::DateTime),
            "json" => Ok(ColumnType::Json),
            other => Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("unknown column type '{}'", other),
            )),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ColumnType::Array(_))
    }

    /// Element type for arrays, the type itself otherwise
    pub fn element_type(&self) -> &ColumnType {
        match self {
            ColumnType::Array(inner) => inner,
            other => other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Decimal | ColumnType::Money)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, ColumnType::Boolean)
    }

    /// Columns that can be ordered with `<`/`>`
    pub fn is_orderable(&self) -> bool {
        !matches!(self, ColumnType::Array(_) | ColumnType::Json)
    }

    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Boolean | ColumnType::Integer => "INTEGER",
            ColumnType::Decimal | ColumnType::Money => "REAL",
            _ => "TEXT",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ColumnType::Id => write!(f, "id"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Varchar(size) => write!(f, "varchar({})", size),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Decimal => write!(f, "decimal"),
            ColumnType::Money => write!(f, "money"),
            ColumnType::DateTime => write!(f, "datetime"),
            ColumnType::Json => write!(f, "json"),
            ColumnType::Array(inner) => write!(f, "[]{}", inner),
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub indexed: bool,
}

impl ColumnDefinition {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        ColumnDefinition {
            name: name.to_string(),
            column_type,
            indexed: false,
        }
    }

    /// Build from a type name, e.g. `ColumnDefinition::parse("qty", "integer")`
    pub fn parse(name: &str, type_name: &str) -> Result<Self> {
        Ok(Self::new(name, ColumnType::parse(type_name)?))
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// Column metadata of one collection; `_id` is always present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub columns: BTreeMap<String, ColumnDefinition>,
}

impl CollectionSchema {
    pub fn new(name: &str) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(
            ID_COLUMN.to_string(),
            ColumnDefinition::new(ID_COLUMN, ColumnType::Id).indexed(),
        );
        CollectionSchema {
            name: name.to_string(),
            columns,
        }
    }

    pub fn with_columns(name: &str, definitions: Vec<ColumnDefinition>) -> Result<Self> {
        let mut schema = CollectionSchema::new(name);
        for definition in definitions {
            schema.add_column(definition)?;
        }
        Ok(schema)
    }

    /// Metadata lookup; unknown columns are rejected
    pub fn column(&self, name: &str) -> Result<&ColumnDefinition> {
        self.columns
            .get(name)
            .ok_or_else(|| Error::unknown_column(&self.name, name))
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn add_column(&mut self, definition: ColumnDefinition) -> Result<()> {
        validate_identifier(&definition.name, "column")?;
        if self.columns.contains_key(&definition.name) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("column '{}' already exists in '{}'", definition.name, self.name),
            ));
        }
        self.columns.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Result<ColumnDefinition> {
        if name == ID_COLUMN {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "the identifier column cannot be removed".to_string(),
            ));
        }
        self.columns
            .remove(name)
            .ok_or_else(|| Error::unknown_column(&self.name, name))
    }

    pub fn list_columns(&self) -> BTreeMap<String, ColumnType> {
        self.columns
            .iter()
            .map(|(name, def)| (name.clone(), def.column_type.clone()))
            .collect()
    }
}

/// Names end up as quoted SQL identifiers and document keys
pub fn validate_identifier(name: &str, what: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("invalid {} name '{}'", what, name),
        ));
    }
    Ok(())
}

/// Collection names must start with a letter; `_` prefixed tables are internal
pub fn validate_collection_name(name: &str) -> Result<()> {
    validate_identifier(name, "collection")?;
    if name.starts_with('_') || name.to_lowercase().starts_with("sqlite_") {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("collection name '{}' is reserved", name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_names() {
        assert_eq!(ColumnType::parse("INT").unwrap(), ColumnType::Integer);
        assert_eq!(ColumnType::parse("varchar(40)").unwrap(), ColumnType::Varchar(40));
        assert_eq!(
            ColumnType::parse("[]varchar(10)").unwrap(),
            ColumnType::Array(Box::new(ColumnType::Varchar(10)))
        );
        assert_eq!(ColumnType::parse("[]integer").unwrap().to_string(), "[]integer");
        assert!(ColumnType::parse("[][]integer").is_err());
        assert!(ColumnType::parse("varchar(x)").is_err());
        assert_eq!(ColumnType::parse("blob").unwrap_err().kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn schema_always_has_identifier() {
        let mut schema = CollectionSchema::with_columns(
            "orders",
            vec![ColumnDefinition::parse("qty", "integer").unwrap()],
        )
        .unwrap();

        assert!(schema.has_column(ID_COLUMN));
        assert!(schema.remove_column(ID_COLUMN).is_err());
        assert_eq!(schema.column("nope").unwrap_err().kind, ErrorKind::UnknownColumn);
        assert!(schema.add_column(ColumnDefinition::parse("bad name", "text").unwrap()).is_err());
    }
}
