use rusqlite::{Connection, Row};

use crate::core::{driver::quote_ident, types::ColumnDescriptor};
use crate::error::AppResult;

pub fn ping(conn: &Connection) -> AppResult<()> {
    // Touches the schema page, so a file that is not a database fails here.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))?;
    Ok(())
}

pub fn list_tables(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
         ORDER BY name",
    )?;
    let rows = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn table_exists(conn: &Connection, table: &str) -> AppResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?1)",
        [table],
        |r| r.get::<_, bool>(0),
    )?;
    Ok(exists)
}

struct TableInfo {
    column: ColumnDescriptor,
    pk: i64,
}

fn table_info(conn: &Connection, table: &str) -> AppResult<Vec<TableInfo>> {
    // PRAGMA arguments cannot be bound; the name is quoted after the catalog check.
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn.prepare(&sql)?;
    let cols = stmt
        .query_map([], |row: &Row<'_>| {
            let cid: i64 = row.get("cid")?;
            let notnull: i64 = row.get("notnull")?;
            Ok(TableInfo {
                column: ColumnDescriptor {
                    name: row.get("name")?,
                    data_type: row.get::<_, Option<String>>("type")?.unwrap_or_default(),
                    nullable: notnull == 0,
                    position: u32::try_from(cid + 1).unwrap_or(u32::MAX),
                },
                pk: row.get("pk")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}

pub fn list_columns(conn: &Connection, table: &str) -> AppResult<Option<Vec<ColumnDescriptor>>> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    let cols = table_info(conn, table)?.into_iter().map(|t| t.column).collect();
    Ok(Some(cols))
}

/// Primary-key columns in key order, or `rowid` for tables without a declared key.
pub fn order_by(conn: &Connection, table: &str) -> AppResult<String> {
    let mut keys: Vec<TableInfo> = table_info(conn, table)?
        .into_iter()
        .filter(|t| t.pk > 0)
        .collect();
    if keys.is_empty() {
        return Ok("rowid".to_string());
    }
    keys.sort_by_key(|t| t.pk);
    Ok(keys
        .iter()
        .map(|t| quote_ident(&t.column.name))
        .collect::<Vec<_>>()
        .join(", "))
}

pub fn count_rows(conn: &Connection, table: &str) -> AppResult<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let n = conn.query_row(&sql, [], |r| r.get::<_, i64>(0))?;
    Ok(n.max(0) as u64)
}
