//! Table-level edits on the structured model. Every operation validates fully before it
//! changes anything, so an error leaves the model as it was.

use crate::error::AppError;
use crate::model::parser::parse_keywords;
use crate::model::types::*;

/// Parses a normalized attribute string into call keywords.
pub fn attribute_keywords(attributes: &str) -> Result<Vec<Keyword>, AppError> {
    parse_keywords(attributes).map_err(AppError::Validation)
}

fn column_def(spec: &ColumnSpec) -> Result<ColumnDef, AppError> {
    Ok(ColumnDef::new(
        spec.name.clone(),
        spec.column_type.as_str(),
        attribute_keywords(&spec.attributes)?,
    ))
}

fn not_found(class_name: &str) -> AppError {
    AppError::NotFound(format!("Table {} not found in models file", class_name))
}

pub fn add_table(model: &mut ModelFile, spec: &TableSpec) -> Result<(), AppError> {
    let table_name = spec.name.to_lowercase();
    let exists = model
        .tables()
        .any(|t| t.class_name == spec.name || t.table_name() == Some(table_name.as_str()));
    if exists {
        return Err(AppError::Conflict(format!(
            "Table {} already exists in models file",
            spec.name
        )));
    }

    let mut table = TableDef::new(spec.name.clone());
    for col in &spec.columns {
        if table.column(&col.name).is_some() {
            return Err(AppError::Validation(format!(
                "Column {} is declared more than once",
                col.name
            )));
        }
        table.push_column(column_def(col)?);
    }
    model.items.push(Item::Table(table));
    Ok(())
}

/// Applies deletions, then additions, then per-column edits.
pub fn edit_table(model: &mut ModelFile, spec: &EditSpec) -> Result<(), AppError> {
    let mut table = model
        .table(&spec.table_name)
        .cloned()
        .ok_or_else(|| not_found(&spec.table_name))?;

    let primary_keys: Vec<&str> = spec
        .delete_columns
        .iter()
        .filter(|name| table.column(name).is_some_and(ColumnDef::is_primary_key))
        .map(String::as_str)
        .collect();
    if !primary_keys.is_empty() {
        return Err(AppError::Conflict(format!(
            "Cannot delete primary key column(s): {}",
            primary_keys.join(", ")
        )));
    }
    table.remove_columns(&spec.delete_columns);

    for col in &spec.add_columns {
        if table.column(&col.name).is_some() {
            return Err(AppError::Conflict(format!(
                "Column {} already exists in table {}",
                col.name, spec.table_name
            )));
        }
        table.push_column(column_def(col)?);
    }

    for edit in &spec.edit_columns {
        let incoming = match &edit.new_attributes {
            Some(attrs) => attribute_keywords(attrs)?,
            None => Vec::new(),
        };
        if let Some(new_name) = &edit.new_name {
            if new_name != &edit.name && table.column(new_name).is_some() {
                return Err(AppError::Conflict(format!(
                    "Column {} already exists in table {}",
                    new_name, spec.table_name
                )));
            }
        }
        let column = table.column_mut(&edit.name).ok_or_else(|| {
            AppError::NotFound(format!(
                "Column {} not found in table {}",
                edit.name, spec.table_name
            ))
        })?;
        column.merge_keywords(incoming);
        if let Some(ty) = edit.new_type {
            column.set_type(ty.as_str());
        }
        if let Some(new_name) = &edit.new_name {
            column.name = new_name.clone();
        }
    }

    if let Some(slot) = model.table_mut(&spec.table_name) {
        *slot = table;
    }
    Ok(())
}

/// Renames both the class and its `__tablename__`; the table must carry both under the old name.
pub fn rename_table(model: &mut ModelFile, old_name: &str, new_name: &str) -> Result<(), AppError> {
    let old_table_name = old_name.to_lowercase();
    let matches_both = model
        .table(old_name)
        .is_some_and(|t| t.table_name() == Some(old_table_name.as_str()));
    if !matches_both {
        return Err(AppError::NotFound(format!(
            "Table '{}' not found in models file",
            old_name
        )));
    }
    let new_table_name = new_name.to_lowercase();
    if old_name != new_name
        && model
            .tables()
            .any(|t| t.class_name == new_name || t.table_name() == Some(new_table_name.as_str()))
    {
        return Err(AppError::Conflict(format!(
            "Table {} already exists in models file",
            new_name
        )));
    }
    if let Some(table) = model.table_mut(old_name) {
        table.class_name = new_name.to_string();
        table.set_table_name(new_table_name);
    }
    Ok(())
}

pub fn delete_table(model: &mut ModelFile, class_name: &str) -> Result<(), AppError> {
    let before = model.items.len();
    model
        .items
        .retain(|item| !matches!(item, Item::Table(t) if t.class_name == class_name));
    if model.items.len() == before {
        return Err(not_found(class_name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parser::parse_model;
    use crate::model::render::render_model;

    fn users_model() -> ModelFile {
        parse_model(
            "Base = declarative_base()\n\n\nclass Users(Base):\n    __tablename__ = 'users'\n    id = Column(Integer, primary_key=True)\n    email = Column(String, nullable=False)\n",
        )
        .unwrap()
    }

    fn column(name: &str, ty: ColumnType, attributes: &str) -> ColumnSpec {
        ColumnSpec {
            name: name.into(),
            column_type: ty,
            attributes: attributes.into(),
        }
    }

    #[test]
    fn add_table_then_inventory_round_trips() {
        let mut model = ModelFile::default();
        let spec = TableSpec {
            name: "Orders".into(),
            columns: vec![
                column("id", ColumnType::Integer, "primary_key=True"),
                column("total", ColumnType::Float, "nullable=False, default=0"),
                column("note", ColumnType::Text, ""),
            ],
        };
        add_table(&mut model, &spec).unwrap();
        let reparsed = parse_model(&render_model(&model)).unwrap();
        let inv = reparsed.inventory();
        assert_eq!(inv.len(), 1);
        assert_eq!(inv[0].table_name, "orders");
        let cols: Vec<(&str, &str, &str)> = inv[0]
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.column_type.as_str(), c.attributes.as_str()))
            .collect();
        assert_eq!(
            cols,
            vec![
                ("id", "Integer", "primary_key=True"),
                ("total", "Float", "nullable=False, default=0"),
                ("note", "Text", ""),
            ]
        );
    }

    #[test]
    fn add_duplicate_table_conflicts() {
        let mut model = users_model();
        let spec = TableSpec {
            name: "Users".into(),
            columns: vec![column("id", ColumnType::Integer, "primary_key=True")],
        };
        assert!(matches!(add_table(&mut model, &spec), Err(AppError::Conflict(_))));
    }

    #[test]
    fn deleting_primary_key_conflicts_and_changes_nothing() {
        let mut model = users_model();
        let original = model.clone();
        let spec = EditSpec {
            table_name: "Users".into(),
            delete_columns: vec!["id".into(), "email".into()],
            ..Default::default()
        };
        let err = edit_table(&mut model, &spec).unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Cannot delete primary key column(s): id"));
        assert_eq!(model, original);
    }

    #[test]
    fn edit_applies_delete_add_and_merge() {
        let mut model = users_model();
        let spec = EditSpec {
            table_name: "Users".into(),
            add_columns: vec![column("age", ColumnType::Integer, "")],
            delete_columns: vec!["missing".into()],
            edit_columns: vec![ColumnEdit {
                name: "email".into(),
                new_name: Some("contact".into()),
                new_type: Some(ColumnType::Text),
                new_attributes: Some("nullable=True, unique=True".into()),
            }],
        };
        edit_table(&mut model, &spec).unwrap();
        let users = model.table("Users").unwrap();
        let names: Vec<&str> = users.columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "contact", "age"]);
        assert_eq!(
            users.column("contact").unwrap().to_source(),
            "contact = Column(Text, nullable=True, unique=True)"
        );
    }

    #[test]
    fn edit_unknown_table_or_column_is_not_found() {
        let mut model = users_model();
        let spec = EditSpec {
            table_name: "Ghost".into(),
            ..Default::default()
        };
        assert!(matches!(edit_table(&mut model, &spec), Err(AppError::NotFound(_))));

        let spec = EditSpec {
            table_name: "Users".into(),
            add_columns: vec![column("age", ColumnType::Integer, "")],
            edit_columns: vec![ColumnEdit {
                name: "nope".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let before = model.clone();
        let err = edit_table(&mut model, &spec).unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Column nope not found in table Users"));
        assert_eq!(model, before);
    }

    #[test]
    fn rename_updates_class_and_tablename() {
        let mut model = users_model();
        rename_table(&mut model, "Users", "Members").unwrap();
        let table = model.table("Members").unwrap();
        assert_eq!(table.table_name(), Some("members"));
        assert!(model.table("Users").is_none());
    }

    #[test]
    fn rename_requires_both_class_and_tablename() {
        let mut model = parse_model("class Users(Base):\n    __tablename__ = 'people'\n    id = Column(Integer, primary_key=True)\n").unwrap();
        let before = model.clone();
        assert!(matches!(rename_table(&mut model, "Users", "Members"), Err(AppError::NotFound(_))));
        assert!(matches!(rename_table(&mut model, "Ghost", "Members"), Err(AppError::NotFound(_))));
        assert_eq!(model, before);
    }

    #[test]
    fn delete_table_removes_block() {
        let mut model = users_model();
        delete_table(&mut model, "Users").unwrap();
        assert_eq!(render_model(&model), "Base = declarative_base()\n");
        assert!(matches!(delete_table(&mut model, "Users"), Err(AppError::NotFound(_))));
    }
}
