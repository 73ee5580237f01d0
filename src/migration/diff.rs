//! Compare the declared schema against the live database and list the operations that bring
//! the database in line.

use super::schema::{DeclaredColumn, DeclaredTable, LiveColumn, LiveSchema, LiveTable};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaOp {
    CreateTable(DeclaredTable),
    DropTable(LiveTable),
    AddColumn {
        table: DeclaredTable,
        column: DeclaredColumn,
    },
    DropColumn {
        table: String,
        column: LiveColumn,
    },
    AlterType {
        table: String,
        column: String,
        from: String,
        to: String,
    },
    AlterNullable {
        table: String,
        column: String,
        nullable: bool,
    },
}

fn type_changed(declared: &DeclaredColumn, live: &LiveColumn) -> bool {
    if declared.base_type != live.base_type() {
        return true;
    }
    matches!((declared.length, live.max_length), (Some(a), Some(b)) if a != b)
}

fn diff_columns(declared: &DeclaredTable, live: &LiveTable, ops: &mut Vec<SchemaOp>) {
    for column in &declared.columns {
        let Some(existing) = live.column(&column.name) else {
            ops.push(SchemaOp::AddColumn {
                table: declared.clone(),
                column: column.clone(),
            });
            continue;
        };
        if type_changed(column, existing) {
            ops.push(SchemaOp::AlterType {
                table: declared.name.clone(),
                column: column.name.clone(),
                from: existing.plain_type(),
                to: column.sql_type(),
            });
        }
        if column.nullable != existing.nullable {
            ops.push(SchemaOp::AlterNullable {
                table: declared.name.clone(),
                column: column.name.clone(),
                nullable: column.nullable,
            });
        }
    }
    for existing in &live.columns {
        if !declared.columns.iter().any(|c| c.name == existing.name)
            && !declared.unmapped.contains(&existing.name)
        {
            ops.push(SchemaOp::DropColumn {
                table: live.name.clone(),
                column: existing.clone(),
            });
        }
    }
}

/// Declared tables are visited in model order; tables only present in the database are
/// dropped last.
pub fn diff_schema(declared: &[DeclaredTable], live: &LiveSchema) -> Vec<SchemaOp> {
    let mut ops = Vec::new();
    for table in declared {
        match live.table(&table.name) {
            None => ops.push(SchemaOp::CreateTable(table.clone())),
            Some(existing) => diff_columns(table, existing, &mut ops),
        }
    }
    for existing in &live.tables {
        if !declared.iter().any(|t| t.name == existing.name) {
            ops.push(SchemaOp::DropTable(existing.clone()));
        }
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::schema::declared_schema;
    use crate::model::parse_model;

    fn live_column(name: &str, data_type: &str, max_length: Option<i32>, nullable: bool) -> LiveColumn {
        LiveColumn {
            name: name.into(),
            data_type: data_type.into(),
            max_length,
            nullable,
            default: None,
            primary_key: false,
        }
    }

    fn declared(src: &str) -> Vec<DeclaredTable> {
        declared_schema(&parse_model(src).unwrap())
    }

    #[test]
    fn new_table_is_created_and_stale_table_dropped() {
        let tables = declared("class Users(Base):\n    __tablename__ = 'users'\n    id = Column(Integer, primary_key=True)\n");
        let live = LiveSchema {
            tables: vec![LiveTable {
                name: "legacy".into(),
                columns: vec![live_column("id", "integer", None, false)],
            }],
        };
        let ops = diff_schema(&tables, &live);
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], SchemaOp::CreateTable(t) if t.name == "users"));
        assert!(matches!(&ops[1], SchemaOp::DropTable(t) if t.name == "legacy"));
    }

    #[test]
    fn column_changes_are_detected() {
        let tables = declared(
            "class Users(Base):\n    __tablename__ = 'users'\n    id = Column(Integer, primary_key=True)\n    name = Column(String(80), nullable=False)\n    age = Column(Integer)\n",
        );
        let mut id = live_column("id", "integer", None, false);
        id.primary_key = true;
        id.default = Some("nextval('users_id_seq'::regclass)".into());
        let live = LiveSchema {
            tables: vec![LiveTable {
                name: "users".into(),
                columns: vec![
                    id,
                    live_column("name", "character varying", Some(50), true),
                    live_column("old", "text", None, true),
                ],
            }],
        };
        let ops = diff_schema(&tables, &live);
        assert_eq!(
            ops[0],
            SchemaOp::AlterType {
                table: "users".into(),
                column: "name".into(),
                from: "VARCHAR(50)".into(),
                to: "VARCHAR(80)".into(),
            }
        );
        assert_eq!(
            ops[1],
            SchemaOp::AlterNullable {
                table: "users".into(),
                column: "name".into(),
                nullable: false,
            }
        );
        assert!(matches!(&ops[2], SchemaOp::AddColumn { column, .. } if column.name == "age"));
        assert!(matches!(&ops[3], SchemaOp::DropColumn { column, .. } if column.name == "old"));
        assert_eq!(ops.len(), 4);
    }

    #[test]
    fn matching_schema_yields_nothing() {
        let tables = declared("class Notes(Base):\n    __tablename__ = 'notes'\n    body = Column(Text, primary_key=True)\n");
        let mut body = live_column("body", "text", None, false);
        body.primary_key = true;
        let live = LiveSchema {
            tables: vec![LiveTable {
                name: "notes".into(),
                columns: vec![body],
            }],
        };
        assert!(diff_schema(&tables, &live).is_empty());
    }

    #[test]
    fn unmapped_and_relationship_declarations_leave_live_columns_alone() {
        let tables = declared(
            "class Users(Base):\n    __tablename__ = 'users'\n    id = Column(Integer, primary_key=True, autoincrement=False)\n    external = Column(UUID)\n    posts = relationship('Post')\n",
        );
        let mut id = live_column("id", "integer", None, false);
        id.primary_key = true;
        let live = LiveSchema {
            tables: vec![LiveTable {
                name: "users".into(),
                columns: vec![id, live_column("external", "uuid", None, true)],
            }],
        };
        assert!(diff_schema(&tables, &live).is_empty());
    }
}
