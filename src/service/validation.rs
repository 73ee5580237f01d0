//! Request payloads and their validation into table/column specs. Nothing here touches the
//! model file; a request that fails here is rejected before any mutation.

use crate::error::AppError;
use crate::model::editor::attribute_keywords;
use crate::model::{ColumnEdit, ColumnSpec, ColumnType, EditSpec, TableSpec};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

pub const ALLOWED_ATTRIBUTES: &[&str] = &[
    "primary_key",
    "nullable",
    "unique",
    "index",
    "default",
    "server_default",
    "autoincrement",
    "foreign_key",
    "comment",
    "",
];

const PRIMARY_KEY_MARKER: &str = "primary_key=True";

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"))
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\w+\s*=\s*.+$").expect("key=value pattern"))
}

/// First character upper-cased, the rest lower-cased.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn normalize_column_name(raw: &str) -> Result<String, AppError> {
    let v = raw.trim().replace(' ', "").to_lowercase();
    if !identifier_re().is_match(&v) {
        return Err(AppError::Validation(
            "Column name must start with a letter or underscore, followed by letters, digits, or underscores."
                .into(),
        ));
    }
    Ok(v)
}

pub fn normalize_table_name(raw: &str) -> Result<String, AppError> {
    let v = capitalize(&raw.trim().replace(' ', "_"));
    if !identifier_re().is_match(&v) {
        return Err(AppError::Validation(
            "Table name must start with a letter or underscore, followed by letters, digits, or underscores."
                .into(),
        ));
    }
    Ok(v)
}

fn lookup_type(v: String) -> Result<ColumnType, AppError> {
    ColumnType::from_name(&v).ok_or_else(|| {
        AppError::Validation(format!(
            "Invalid type '{}'. Allowed types are: {}",
            v,
            ColumnType::allowed_list()
        ))
    })
}

/// Creation-time type: text before the first comma, capitalized.
pub fn validate_type(raw: &str) -> Result<ColumnType, AppError> {
    let head = raw.trim().split(',').next().unwrap_or_default();
    lookup_type(capitalize(head))
}

/// Edit-time type: the whole trimmed value, capitalized.
pub fn validate_edit_type(raw: &str) -> Result<ColumnType, AppError> {
    lookup_type(capitalize(raw.trim()))
}

/// Attribute text may arrive as one string or as a list of fragments.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum AttributesInput {
    One(String),
    Many(Vec<String>),
}

impl AttributesInput {
    fn joined(&self) -> String {
        match self {
            AttributesInput::One(s) => s.clone(),
            AttributesInput::Many(parts) => parts.join(", "),
        }
    }
}

fn fragments(text: &str) -> Vec<&str> {
    text.split(',').map(str::trim).collect()
}

/// Creation-time attributes: every fragment's key must be in [`ALLOWED_ATTRIBUTES`].
pub fn validate_attributes(input: &AttributesInput) -> Result<String, AppError> {
    let text = input.joined();
    let parts = fragments(&text);
    for part in &parts {
        let key = part.split('=').next().unwrap_or_default().trim();
        if !ALLOWED_ATTRIBUTES.contains(&key) {
            return Err(AppError::Validation(format!(
                "Invalid attribute '{}'. Allowed attributes are: {}",
                key,
                ALLOWED_ATTRIBUTES.join(", ")
            )));
        }
    }
    let normalized = parts.join(", ");
    attribute_keywords(&normalized)?;
    Ok(normalized)
}

/// Edit-time attributes: any `key=value` fragment is accepted.
pub fn validate_edit_attributes(raw: &str) -> Result<Option<String>, AppError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let parts = fragments(raw);
    for part in &parts {
        if !key_value_re().is_match(part) {
            return Err(AppError::Validation(format!(
                "Invalid attribute format: '{}'. Expected format is 'key=value'.",
                part
            )));
        }
    }
    let normalized = parts.join(", ");
    attribute_keywords(&normalized)?;
    Ok(Some(normalized))
}

#[derive(Clone, Debug, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub attributes: Option<AttributesInput>,
}

impl ColumnDefinition {
    pub fn validate(&self) -> Result<ColumnSpec, AppError> {
        Ok(ColumnSpec {
            name: normalize_column_name(&self.name)?,
            column_type: validate_type(&self.type_)?,
            attributes: match &self.attributes {
                Some(a) => validate_attributes(a)?,
                None => String::new(),
            },
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateTableRequest {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl CreateTableRequest {
    pub fn validate(&self) -> Result<TableSpec, AppError> {
        let name = normalize_table_name(&self.table_name)?;
        let columns = self
            .columns
            .iter()
            .map(ColumnDefinition::validate)
            .collect::<Result<Vec<_>, _>>()?;
        if !columns.iter().any(|c| c.attributes.contains(PRIMARY_KEY_MARKER)) {
            return Err(AppError::Validation(
                "At least one column must be defined as the primary key.".into(),
            ));
        }
        Ok(TableSpec { name, columns })
    }
}

/// Column added through an edit; attributes use the loose `key=value` rule.
#[derive(Clone, Debug, Deserialize)]
pub struct ColumnEditDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub attributes: Option<String>,
}

impl ColumnEditDefinition {
    /// `None` when the entry has no name or no type; such entries are skipped.
    fn validate(&self) -> Result<Option<ColumnSpec>, AppError> {
        let type_ = match self.type_.as_deref() {
            Some(t) if !t.is_empty() && !self.name.is_empty() => t,
            _ => return Ok(None),
        };
        Ok(Some(ColumnSpec {
            name: normalize_column_name(&self.name)?,
            column_type: validate_edit_type(type_)?,
            attributes: validate_edit_attributes(self.attributes.as_deref().unwrap_or_default())?
                .unwrap_or_default(),
        }))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EditColumnRequest {
    pub name: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub new_type: Option<String>,
    #[serde(default)]
    pub new_attributes: Option<String>,
}

impl EditColumnRequest {
    fn validate(&self) -> Result<ColumnEdit, AppError> {
        Ok(ColumnEdit {
            name: normalize_column_name(&self.name)?,
            new_name: match self.new_name.as_deref() {
                Some(n) if !n.is_empty() => Some(normalize_column_name(n)?),
                _ => None,
            },
            new_type: match self.new_type.as_deref() {
                Some(t) if !t.is_empty() => Some(validate_edit_type(t)?),
                _ => None,
            },
            new_attributes: match self.new_attributes.as_deref() {
                Some(a) => validate_edit_attributes(a)?,
                None => None,
            },
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EditTableRequest {
    pub table_name: String,
    #[serde(default)]
    pub add_columns: Option<Vec<ColumnEditDefinition>>,
    #[serde(default)]
    pub delete_columns: Option<Vec<String>>,
    #[serde(default)]
    pub edit_columns: Option<Vec<EditColumnRequest>>,
}

impl EditTableRequest {
    pub fn validate(&self) -> Result<EditSpec, AppError> {
        let mut add_columns = Vec::new();
        for col in self.add_columns.iter().flatten() {
            if let Some(spec) = col.validate()? {
                add_columns.push(spec);
            }
        }
        let edit_columns = self
            .edit_columns
            .iter()
            .flatten()
            .filter(|c| !c.name.is_empty())
            .map(EditColumnRequest::validate)
            .collect::<Result<Vec<_>, _>>()?;
        let delete_columns = self
            .delete_columns
            .iter()
            .flatten()
            .filter(|c| !c.is_empty())
            .cloned()
            .collect();
        Ok(EditSpec {
            table_name: capitalize(&self.table_name),
            add_columns,
            delete_columns,
            edit_columns,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RenameTableRequest {
    pub old_name: String,
    pub new_name: String,
}

impl RenameTableRequest {
    pub fn validate(&self) -> Result<(String, String), AppError> {
        Ok((
            normalize_table_name(&self.old_name)?,
            normalize_table_name(&self.new_name)?,
        ))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DeleteTableRequest {
    pub table_name: String,
}

impl DeleteTableRequest {
    pub fn validate(&self) -> String {
        capitalize(&self.table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: &str, attrs: Option<&str>) -> ColumnDefinition {
        ColumnDefinition {
            name: name.into(),
            type_: ty.into(),
            attributes: attrs.map(|a| AttributesInput::One(a.into())),
        }
    }

    #[test]
    fn column_normalization_is_a_fixed_point() {
        let first = col(" Email Address ", "string, length=5", Some(" nullable=False ,unique=True"))
            .validate()
            .unwrap();
        assert_eq!(first.name, "emailaddress");
        assert_eq!(first.column_type, ColumnType::String);
        assert_eq!(first.attributes, "nullable=False, unique=True");

        let again = col(&first.name, first.column_type.as_str(), Some(&first.attributes))
            .validate()
            .unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn table_names_are_capitalized() {
        assert_eq!(normalize_table_name(" user profiles ").unwrap(), "User_profiles");
        assert_eq!(normalize_table_name("USERS").unwrap(), "Users");
        assert!(normalize_table_name("9lives").is_err());
    }

    #[test]
    fn invalid_type_names_the_offender() {
        let err = validate_type("uuid").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid type 'Uuid'. Allowed types are: Integer, String, Float, Boolean, Date, Text"
        );
    }

    #[test]
    fn attribute_keys_come_from_the_allowed_set() {
        let list = AttributesInput::Many(vec!["primary_key=True".into(), "index=True".into()]);
        assert_eq!(validate_attributes(&list).unwrap(), "primary_key=True, index=True");
        let err = validate_attributes(&AttributesInput::One("collation='C'".into())).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.starts_with("Invalid attribute 'collation'")));
    }

    #[test]
    fn create_requires_primary_key() {
        let without = CreateTableRequest {
            table_name: "users".into(),
            columns: vec![col("id", "Integer", None), col("email", "String", None)],
        };
        let err = without.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("primary key")));

        let with = CreateTableRequest {
            table_name: "users".into(),
            columns: vec![col("id", "Integer", Some("primary_key=True")), col("email", "String", None)],
        };
        let spec = with.validate().unwrap();
        assert_eq!(spec.name, "Users");
        assert_eq!(spec.columns[1].attributes, "");
    }

    #[test]
    fn edit_attributes_accept_any_key() {
        assert_eq!(
            validate_edit_attributes("collation='C', nullable=False").unwrap(),
            Some("collation='C', nullable=False".into())
        );
        assert!(validate_edit_attributes("nullable").is_err());
        assert_eq!(validate_edit_attributes("").unwrap(), None);
    }

    #[test]
    fn edit_request_skips_incomplete_entries() {
        let req: EditTableRequest = serde_json::from_value(serde_json::json!({
            "table_name": "users",
            "add_columns": [{"name": "age", "type": "integer"}, {"name": "x", "type": null}],
            "delete_columns": ["", "email"],
            "edit_columns": [{"name": "Name", "new_type": "text"}]
        }))
        .unwrap();
        let spec = req.validate().unwrap();
        assert_eq!(spec.table_name, "Users");
        assert_eq!(spec.add_columns.len(), 1);
        assert_eq!(spec.add_columns[0].column_type, ColumnType::Integer);
        assert_eq!(spec.delete_columns, vec!["email".to_string()]);
        assert_eq!(spec.edit_columns[0].name, "name");
        assert_eq!(spec.edit_columns[0].new_type, Some(ColumnType::Text));
    }
}
