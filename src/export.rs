/// Export Module
///
/// Renders query results as delimited text or JSON. Mechanical marshaling on
/// top of the connection's execute primitive; the only subtlety is quoting
/// cells that contain the delimiter, a quote, or a line break.
use crate::core::db::client::Value;
use crate::core::db::connection::Connection;
use crate::core::Result;

/// Executes a query and renders the result as delimited text with a header
/// row.
pub fn to_delimited(
    conn: &mut Connection,
    sql: &str,
    params: &[Value],
    delimiter: char,
) -> Result<String> {
    conn.execute(sql, params)?;

    let mut output = String::new();
    let headers = conn
        .last_executed()
        .map(|stmt| stmt.columns())
        .unwrap_or_default();
    if !headers.is_empty() {
        let cells: Vec<String> = headers.iter().map(|h| escape_cell(h, delimiter)).collect();
        output.push_str(&cells.join(&delimiter.to_string()));
        output.push('\n');
    }
    while let Some(row) = conn.fetch_row_values() {
        let cells: Vec<String> = row
            .iter()
            .map(|v| escape_cell(&v.to_string(), delimiter))
            .collect();
        output.push_str(&cells.join(&delimiter.to_string()));
        output.push('\n');
    }
    Ok(output)
}

/// Executes a query and renders the result as comma-separated text.
pub fn to_csv(conn: &mut Connection, sql: &str, params: &[Value]) -> Result<String> {
    to_delimited(conn, sql, params, ',')
}

/// Executes a query and returns the result as a JSON array of objects.
pub fn to_json(conn: &mut Connection, sql: &str, params: &[Value]) -> Result<String> {
    let mut rows = Vec::new();
    conn.execute(sql, params)?;
    let headers = conn
        .last_executed()
        .map(|stmt| stmt.columns())
        .unwrap_or_default();
    while let Some(row) = conn.fetch_row_values() {
        let mut object = serde_json::Map::new();
        for (header, value) in headers.iter().zip(row.iter()) {
            object.insert(header.clone(), value.to_json());
        }
        rows.push(serde_json::Value::Object(object));
    }
    Ok(serde_json::to_string(&rows)?)
}

fn escape_cell(cell: &str, delimiter: char) -> String {
    if cell.contains(delimiter) || cell.contains('"') || cell.contains('\n') || cell.contains('\r')
    {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
