//! Render schema operations as PostgreSQL DDL for the upgrade and downgrade sections of a
//! revision script.

use super::diff::SchemaOp;
use super::schema::{DeclaredColumn, DeclaredTable, LiveColumn, LiveTable};

/// Double-quoted identifier; embedded quotes are doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn index_name(table: &str, column: &str) -> String {
    format!("ix_{}_{}", table, column)
}

fn declared_column_def(table: &DeclaredTable, column: &DeclaredColumn) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), table.column_sql_type(column));
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(ref d) = column.server_default {
        def.push_str(" DEFAULT ");
        def.push_str(d);
    }
    def
}

fn live_column_def(column: &LiveColumn) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), column.sql_type());
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(ref d) = column.default {
        if !column.is_serial() {
            def.push_str(" DEFAULT ");
            def.push_str(d);
        }
    }
    def
}

/// Indexes and comments that follow a CREATE TABLE or ADD COLUMN.
fn column_extras(table: &str, column: &DeclaredColumn, out: &mut Vec<String>) {
    if column.index {
        out.push(format!(
            "CREATE {}INDEX {} ON {} ({});",
            if column.unique { "UNIQUE " } else { "" },
            quote_ident(&index_name(table, &column.name)),
            quote_ident(table),
            quote_ident(&column.name)
        ));
    }
    if let Some(ref c) = column.comment {
        out.push(format!(
            "COMMENT ON COLUMN {}.{} IS {};",
            quote_ident(table),
            quote_ident(&column.name),
            quote_literal(c)
        ));
    }
}

fn create_table(table: &DeclaredTable) -> Vec<String> {
    let mut defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| declared_column_def(table, c))
        .collect();
    let pk: Vec<String> = table.primary_key().into_iter().map(quote_ident).collect();
    if !pk.is_empty() {
        defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    for c in &table.columns {
        if c.unique && !c.index {
            defs.push(format!("UNIQUE ({})", quote_ident(&c.name)));
        }
        if let Some(ref fk) = c.foreign_key {
            defs.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_ident(&c.name),
                quote_ident(&fk.table),
                quote_ident(&fk.column)
            ));
        }
    }
    let mut out = vec![format!(
        "CREATE TABLE {} (\n    {}\n);",
        quote_ident(&table.name),
        defs.join(",\n    ")
    )];
    for c in &table.columns {
        column_extras(&table.name, c, &mut out);
    }
    out
}

fn recreate_table(table: &LiveTable) -> Vec<String> {
    let mut defs: Vec<String> = table.columns.iter().map(live_column_def).collect();
    let pk: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| quote_ident(&c.name))
        .collect();
    if !pk.is_empty() {
        defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    vec![format!(
        "CREATE TABLE {} (\n    {}\n);",
        quote_ident(&table.name),
        defs.join(",\n    ")
    )]
}

fn add_column(table: &DeclaredTable, column: &DeclaredColumn) -> Vec<String> {
    let name = quote_ident(&table.name);
    let mut out = vec![format!(
        "ALTER TABLE {} ADD COLUMN {};",
        name,
        declared_column_def(table, column)
    )];
    if column.unique && !column.index {
        out.push(format!("ALTER TABLE {} ADD UNIQUE ({});", name, quote_ident(&column.name)));
    }
    if let Some(ref fk) = column.foreign_key {
        out.push(format!(
            "ALTER TABLE {} ADD FOREIGN KEY ({}) REFERENCES {} ({});",
            name,
            quote_ident(&column.name),
            quote_ident(&fk.table),
            quote_ident(&fk.column)
        ));
    }
    column_extras(&table.name, column, &mut out);
    out
}

fn drop_column(table: &str, column: &str) -> String {
    format!("ALTER TABLE {} DROP COLUMN {};", quote_ident(table), quote_ident(column))
}

fn alter_type(table: &str, column: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
        quote_ident(table),
        quote_ident(column),
        to,
        quote_ident(column),
        to
    )
}

fn alter_nullable(table: &str, column: &str, nullable: bool) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL;",
        quote_ident(table),
        quote_ident(column),
        if nullable { "DROP" } else { "SET" }
    )
}

fn upgrade(op: &SchemaOp) -> Vec<String> {
    match op {
        SchemaOp::CreateTable(t) => create_table(t),
        SchemaOp::DropTable(t) => vec![format!("DROP TABLE {};", quote_ident(&t.name))],
        SchemaOp::AddColumn { table, column } => add_column(table, column),
        SchemaOp::DropColumn { table, column } => vec![drop_column(table, &column.name)],
        SchemaOp::AlterType { table, column, to, .. } => vec![alter_type(table, column, to)],
        SchemaOp::AlterNullable {
            table,
            column,
            nullable,
        } => vec![alter_nullable(table, column, *nullable)],
    }
}

fn downgrade(op: &SchemaOp) -> Vec<String> {
    match op {
        SchemaOp::CreateTable(t) => vec![format!("DROP TABLE {};", quote_ident(&t.name))],
        SchemaOp::DropTable(t) => recreate_table(t),
        SchemaOp::AddColumn { table, column } => vec![drop_column(&table.name, &column.name)],
        SchemaOp::DropColumn { table, column } => vec![format!(
            "ALTER TABLE {} ADD COLUMN {};",
            quote_ident(table),
            live_column_def(column)
        )],
        SchemaOp::AlterType {
            table, column, from, ..
        } => vec![alter_type(table, column, from)],
        SchemaOp::AlterNullable {
            table,
            column,
            nullable,
        } => vec![alter_nullable(table, column, !*nullable)],
    }
}

/// Upgrade SQL in operation order and downgrade SQL in reverse order.
pub fn render_ops(ops: &[SchemaOp]) -> (String, String) {
    let up: Vec<String> = ops.iter().flat_map(upgrade).collect();
    let down: Vec<String> = ops.iter().rev().flat_map(downgrade).collect();
    (up.join("\n"), down.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::diff::diff_schema;
    use crate::migration::schema::{declared_schema, LiveSchema};
    use crate::model::parse_model;

    #[test]
    fn create_table_renders_constraints_and_indexes() {
        let model = parse_model(
            "class Users(Base):\n    __tablename__ = 'users'\n    id = Column(Integer, primary_key=True)\n    email = Column(String(120), unique=True, index=True)\n    team_id = Column(Integer, foreign_key='teams.id')\n",
        )
        .unwrap();
        let ops = diff_schema(&declared_schema(&model), &LiveSchema::default());
        let (up, down) = render_ops(&ops);
        assert_eq!(
            up,
            "CREATE TABLE \"users\" (\n    \"id\" SERIAL NOT NULL,\n    \"email\" VARCHAR(120),\n    \"team_id\" INTEGER,\n    PRIMARY KEY (\"id\"),\n    FOREIGN KEY (\"team_id\") REFERENCES \"teams\" (\"id\")\n);\nCREATE UNIQUE INDEX \"ix_users_email\" ON \"users\" (\"email\");"
        );
        assert_eq!(down, "DROP TABLE \"users\";");
    }

    #[test]
    fn downgrade_reverses_column_ops() {
        let ops = vec![
            SchemaOp::AlterNullable {
                table: "t".into(),
                column: "a".into(),
                nullable: false,
            },
            SchemaOp::AlterType {
                table: "t".into(),
                column: "b".into(),
                from: "INTEGER".into(),
                to: "TEXT".into(),
            },
        ];
        let (up, down) = render_ops(&ops);
        assert_eq!(
            up,
            "ALTER TABLE \"t\" ALTER COLUMN \"a\" SET NOT NULL;\nALTER TABLE \"t\" ALTER COLUMN \"b\" TYPE TEXT USING \"b\"::TEXT;"
        );
        assert_eq!(
            down,
            "ALTER TABLE \"t\" ALTER COLUMN \"b\" TYPE INTEGER USING \"b\"::INTEGER;\nALTER TABLE \"t\" ALTER COLUMN \"a\" DROP NOT NULL;"
        );
    }

    #[test]
    fn dropped_table_is_recreated_on_downgrade() {
        let ops = vec![SchemaOp::DropTable(LiveTable {
            name: "old".into(),
            columns: vec![LiveColumn {
                name: "id".into(),
                data_type: "integer".into(),
                max_length: None,
                nullable: false,
                default: Some("nextval('old_id_seq'::regclass)".into()),
                primary_key: true,
            }],
        })];
        let (up, down) = render_ops(&ops);
        assert_eq!(up, "DROP TABLE \"old\";");
        assert_eq!(down, "CREATE TABLE \"old\" (\n    \"id\" SERIAL NOT NULL,\n    PRIMARY KEY (\"id\")\n);");
    }

    #[test]
    fn identifiers_double_embedded_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
