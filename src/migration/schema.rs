//! Declared schema (from the model file) and live schema (from the database catalog), in
//! comparable form.

use crate::model::{ColumnDef, ColumnType, Expr, ModelFile, GENERIC_COLUMN};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    /// `information_schema.columns.data_type`, e.g. `character varying`.
    pub data_type: String,
    pub max_length: Option<i32>,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

impl LiveColumn {
    pub fn base_type(&self) -> String {
        canonical_type(&self.data_type)
    }

    /// Whether the column is backed by a sequence (a SERIAL column).
    pub fn is_serial(&self) -> bool {
        self.default
            .as_deref()
            .is_some_and(|d| d.starts_with("nextval("))
    }

    pub fn sql_type(&self) -> String {
        let base = self.base_type();
        if self.is_serial() && base == "INTEGER" {
            return "SERIAL".into();
        }
        if self.is_serial() && base == "BIGINT" {
            return "BIGSERIAL".into();
        }
        self.plain_type()
    }

    /// Storage type without the SERIAL shorthand, e.g. `VARCHAR(50)`.
    pub fn plain_type(&self) -> String {
        let base = self.base_type();
        match self.max_length {
            Some(n) => format!("{}({})", base, n),
            None => base,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveTable {
    pub name: String,
    pub columns: Vec<LiveColumn>,
}

impl LiveTable {
    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiveSchema {
    pub tables: Vec<LiveTable>,
}

impl LiveSchema {
    pub fn table(&self, name: &str) -> Option<&LiveTable> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Upper-case SQL spelling of a catalog type name.
pub fn canonical_type(data_type: &str) -> String {
    match data_type.to_lowercase().as_str() {
        "character varying" | "varchar" => "VARCHAR".into(),
        "integer" | "int" | "int4" => "INTEGER".into(),
        "bigint" | "int8" => "BIGINT".into(),
        "double precision" | "float8" => "DOUBLE PRECISION".into(),
        "boolean" | "bool" => "BOOLEAN".into(),
        other => other.to_uppercase(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclaredColumn {
    pub name: String,
    /// Comparable type, e.g. `VARCHAR` or `INTEGER`.
    pub base_type: String,
    pub length: Option<i32>,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub nullable: bool,
    pub unique: bool,
    pub index: bool,
    /// SQL expression for `DEFAULT`.
    pub server_default: Option<String>,
    pub foreign_key: Option<ForeignKeyRef>,
    pub comment: Option<String>,
}

impl DeclaredColumn {
    pub fn sql_type(&self) -> String {
        match self.length {
            Some(n) => format!("{}({})", self.base_type, n),
            None => self.base_type.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclaredTable {
    pub name: String,
    pub columns: Vec<DeclaredColumn>,
    /// Columns declared with a type that has no SQL mapping. Migrations leave them alone.
    pub unmapped: Vec<String>,
}

impl DeclaredTable {
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// A lone integer primary key is generated as SERIAL unless `autoincrement=False`.
    pub fn column_sql_type(&self, column: &DeclaredColumn) -> String {
        let pk = self.primary_key();
        if column.base_type == "INTEGER" && column.autoincrement && pk == [column.name.as_str()] {
            "SERIAL".into()
        } else {
            column.sql_type()
        }
    }
}

/// SQL type for a constructor name, covering the accepted column types and the common
/// SQLAlchemy types a hand-edited model may use.
fn base_sql_type(type_name: &str) -> Option<&'static str> {
    if let Some(ty) = ColumnType::from_name(type_name) {
        return Some(match ty {
            ColumnType::Integer => "INTEGER",
            ColumnType::String => "VARCHAR",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Text => "TEXT",
        });
    }
    match type_name {
        "BigInteger" => Some("BIGINT"),
        "SmallInteger" => Some("SMALLINT"),
        "DateTime" => Some("TIMESTAMP WITHOUT TIME ZONE"),
        "Numeric" => Some("NUMERIC"),
        _ => None,
    }
}

/// Renders a Python-side literal as a SQL default: strings are quoted, `text('...')` is raw.
fn server_default_sql(value: &Expr) -> Option<String> {
    match value {
        Expr::Str(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Expr::Number(n) => Some(n.clone()),
        Expr::Neg(inner) => server_default_sql(inner).map(|s| format!("-{}", s)),
        Expr::Name(_) => value
            .as_bool()
            .map(|b| if b { "TRUE".to_string() } else { "FALSE".to_string() }),
        Expr::Call { func, args, .. } if func.callee_name() == Some("text") => {
            args.first().and_then(Expr::as_str_literal).map(str::to_string)
        }
        _ => None,
    }
}

fn foreign_key_ref(column: &ColumnDef) -> Option<ForeignKeyRef> {
    let target = column
        .keyword("foreign_key")
        .and_then(Expr::as_str_literal)
        .map(str::to_string)
        .or_else(|| {
            // Column(Integer, ForeignKey('users.id'))
            match &column.value {
                Expr::Call { args, .. } => args.iter().find_map(|a| match a {
                    Expr::Call { func, args, .. } if func.callee_name() == Some("ForeignKey") => {
                        args.first().and_then(Expr::as_str_literal).map(str::to_string)
                    }
                    _ => None,
                }),
                _ => None,
            }
        })?;
    let (table, col) = target.split_once('.')?;
    Some(ForeignKeyRef {
        table: table.to_string(),
        column: col.to_string(),
    })
}

enum Declaration {
    Column(DeclaredColumn),
    /// A column whose type has no SQL mapping.
    Unmapped,
    /// `relationship(...)`, `column_property(...)`, plain values.
    NotAColumn,
}

fn declared_column(table: &str, column: &ColumnDef) -> Declaration {
    let callee = match &column.value {
        Expr::Call { func, .. } => func.callee_name(),
        _ => None,
    };
    let is_column = callee == Some(GENERIC_COLUMN);
    if !is_column && callee.and_then(base_sql_type).is_none() {
        tracing::debug!(table, column = %column.name, "not a column declaration; skipped");
        return Declaration::NotAColumn;
    }
    let type_name = column.type_name();
    let Some(base_type) = base_sql_type(&type_name) else {
        tracing::warn!(
            table,
            column = %column.name,
            column_type = %type_name,
            "unsupported column type; left out of migrations"
        );
        return Declaration::Unmapped;
    };
    let length = match column.type_expr() {
        Some(Expr::Call { args, .. }) if base_type == "VARCHAR" => match args.first() {
            Some(Expr::Number(n)) => n.parse::<i32>().ok(),
            _ => None,
        },
        _ => None,
    };
    let flag = |key: &str| column.keyword(key).and_then(Expr::as_bool);
    let primary_key = flag("primary_key").unwrap_or(false);
    Declaration::Column(DeclaredColumn {
        name: column.name.clone(),
        base_type: base_type.to_string(),
        length,
        primary_key,
        autoincrement: flag("autoincrement").unwrap_or(true),
        nullable: flag("nullable").unwrap_or(!primary_key),
        unique: flag("unique").unwrap_or(false),
        index: flag("index").unwrap_or(false),
        server_default: column.keyword("server_default").and_then(server_default_sql),
        foreign_key: foreign_key_ref(column),
        comment: column
            .keyword("comment")
            .and_then(Expr::as_str_literal)
            .map(str::to_string),
    })
}

/// Tables as the model file declares them. Tables without `__tablename__` are skipped.
pub fn declared_schema(model: &ModelFile) -> Vec<DeclaredTable> {
    let mut out = Vec::new();
    for table in model.tables() {
        let Some(name) = table.table_name() else {
            tracing::debug!(class = %table.class_name, "class without __tablename__ skipped");
            continue;
        };
        let mut declared = DeclaredTable {
            name: name.to_string(),
            columns: Vec::new(),
            unmapped: Vec::new(),
        };
        for column in table.columns() {
            match declared_column(name, column) {
                Declaration::Column(c) => declared.columns.push(c),
                Declaration::Unmapped => declared.unmapped.push(column.name.clone()),
                Declaration::NotAColumn => {}
            }
        }
        out.push(declared);
    }
    out
}
