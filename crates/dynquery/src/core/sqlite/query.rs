use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::{params, types::ValueRef, Connection, Params, Row, Statement};

use super::{readonly, schema};
use crate::core::{
    driver::quote_ident,
    types::{DbRow, QueryResult},
};
use crate::error::AppResult;

pub fn run_query(conn: &Connection, sql: &str, read_only: bool) -> AppResult<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    if read_only {
        readonly::ensure_readonly(&stmt)?;
    }
    collect_rows(&mut stmt, [])
}

pub fn fetch_rows(conn: &Connection, table: &str, limit: u64, offset: u64) -> AppResult<QueryResult> {
    let order = schema::order_by(conn, table)?;
    let sql = format!(
        "SELECT * FROM {} ORDER BY {order} LIMIT ?1 OFFSET ?2",
        quote_ident(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    collect_rows(&mut stmt, params![limit, offset])
}

fn collect_rows<P: Params>(stmt: &mut Statement<'_>, params: P) -> AppResult<QueryResult> {
    let col_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let mut rows = Vec::new();
    let mut r = stmt.query(params)?;
    while let Some(row) = r.next()? {
        rows.push(row_to_json_object(row, &col_names)?);
    }
    Ok(rows)
}

fn row_to_json_object(row: &Row<'_>, col_names: &[String]) -> AppResult<DbRow> {
    let mut out = DbRow::new();
    for (i, name) in col_names.iter().enumerate() {
        let v = match row.get_ref(i)? {
            ValueRef::Null => serde_json::Value::Null,
            ValueRef::Integer(x) => serde_json::Value::from(x),
            ValueRef::Real(x) => serde_json::Value::from(x),
            ValueRef::Text(t) => serde_json::Value::from(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => serde_json::json!({
                "$type": "blob",
                "base64": STANDARD.encode(b),
                "size": b.len()
            }),
        };
        out.insert(name.clone(), v);
    }
    Ok(out)
}
