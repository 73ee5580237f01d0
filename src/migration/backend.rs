//! Database side of the migration engine: version bookkeeping, transactional script
//! application and catalog inspection.

use super::ddl::quote_ident;
use super::schema::{LiveColumn, LiveSchema, LiveTable};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::PgPool;

#[async_trait]
pub trait MigrationBackend: Send + Sync {
    /// Revision ids recorded in the version table, sorted.
    async fn current_versions(&self) -> Result<Vec<String>, AppError>;

    /// Runs `sql` and replaces the recorded versions with `versions`, atomically.
    async fn apply(&self, sql: &str, versions: &[String]) -> Result<(), AppError>;

    /// Tables and columns of the managed schema, excluding the version table.
    async fn inspect(&self) -> Result<LiveSchema, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

pub struct PgBackend {
    pool: PgPool,
    schema: String,
    version_table: String,
}

impl PgBackend {
    pub fn new(pool: PgPool, schema: impl Into<String>, version_table: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
            version_table: version_table.into(),
        }
    }

    fn qualified_version_table(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.version_table))
    }

    /// Create the schema and the version table if missing.
    pub async fn ensure_version_table(&self) -> Result<(), AppError> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&self.schema)))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (version_num VARCHAR(32) NOT NULL PRIMARY KEY)",
            self.qualified_version_table()
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const INSPECT_COLUMNS: &str = r#"
SELECT
    c.table_name::text,
    c.column_name::text,
    c.data_type::text,
    c.character_maximum_length::int4,
    (c.is_nullable = 'YES') AS nullable,
    c.column_default::text,
    EXISTS (
        SELECT 1
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage k
          ON k.constraint_name = tc.constraint_name
         AND k.table_schema = tc.table_schema
         AND k.table_name = tc.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
          AND tc.table_schema = c.table_schema
          AND tc.table_name = c.table_name
          AND k.column_name = c.column_name
    ) AS primary_key
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema
 AND t.table_name = c.table_name
 AND t.table_type = 'BASE TABLE'
WHERE c.table_schema::text = $1 AND c.table_name::text <> $2
ORDER BY c.table_name, c.ordinal_position
"#;

type ColumnRow = (String, String, String, Option<i32>, bool, Option<String>, bool);

#[async_trait]
impl MigrationBackend for PgBackend {
    async fn current_versions(&self) -> Result<Vec<String>, AppError> {
        self.ensure_version_table().await?;
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT version_num FROM {} ORDER BY version_num",
            self.qualified_version_table()
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn apply(&self, sql: &str, versions: &[String]) -> Result<(), AppError> {
        self.ensure_version_table().await?;
        let mut tx = self.pool.begin().await?;
        let conn: &mut sqlx::PgConnection = &mut tx;
        let search_path = format!("SET LOCAL search_path TO {}", quote_ident(&self.schema));
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&search_path)).await?;
        if !sql.trim().is_empty() {
            sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql)).await?;
        }
        let table = self.qualified_version_table();
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *conn)
            .await?;
        for v in versions {
            sqlx::query(&format!("INSERT INTO {} (version_num) VALUES ($1)", table))
                .bind(v)
                .execute(&mut *conn)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn inspect(&self) -> Result<LiveSchema, AppError> {
        let rows: Vec<ColumnRow> = sqlx::query_as(INSPECT_COLUMNS)
            .bind(&self.schema)
            .bind(&self.version_table)
            .fetch_all(&self.pool)
            .await?;
        let mut schema = LiveSchema::default();
        for (table, name, data_type, max_length, nullable, default, primary_key) in rows {
            let column = LiveColumn {
                name,
                data_type,
                max_length,
                nullable,
                default,
                primary_key,
            };
            // Rows arrive grouped by table.
            match schema.tables.last_mut() {
                Some(last) if last.name == table => last.columns.push(column),
                _ => schema.tables.push(LiveTable {
                    name: table,
                    columns: vec![column],
                }),
            }
        }
        Ok(schema)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}
