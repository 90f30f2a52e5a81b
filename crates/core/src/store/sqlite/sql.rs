//! SQL generation and value conversion for the SQLite backend.
//!
//! Identifiers are validated and double-quoted; every value travels as a
//! positional parameter.

use tokio_rusqlite::rusqlite;
use tokio_rusqlite::rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

use crate::Error;
use crate::value::{Filter, Row, Value};

/// Double-quote a table or column name after checking its shape.
pub(crate) fn quote_identifier(name: &str) -> Result<String, Error> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

/// Render a filter as a SQL condition, appending its parameters.
pub(crate) fn condition(filter: &Filter, params: &mut Vec<Value>) -> Result<String, Error> {
    let sql = match filter {
        Filter::All => "1".to_string(),
        Filter::Nothing => "0".to_string(),
        Filter::Eq(field, value) => {
            params.push(value.clone());
            format!("{} = ?", quote_identifier(field)?)
        }
        Filter::IsNull(field) => format!("{} IS NULL", quote_identifier(field)?),
        Filter::AnyNull(fields) if fields.is_empty() => "0".to_string(),
        Filter::AnyNull(fields) => {
            let parts = fields
                .iter()
                .map(|f| Ok(format!("{} IS NULL", quote_identifier(f)?)))
                .collect::<Result<Vec<_>, Error>>()?;
            format!("({})", parts.join(" OR "))
        }
        Filter::And(filters) => join(filters, " AND ", "1", params)?,
        Filter::Or(filters) => join(filters, " OR ", "0", params)?,
        Filter::Raw(raw) => format!("({raw})"),
    };
    Ok(sql)
}

fn join(filters: &[Filter], op: &str, empty: &str, params: &mut Vec<Value>) -> Result<String, Error> {
    if filters.is_empty() {
        return Ok(empty.to_string());
    }
    let parts = filters
        .iter()
        .map(|f| condition(f, params))
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(format!("({})", parts.join(op)))
}

pub(crate) fn update_statement(table: &str, values: &Row, filter: &Filter) -> Result<(String, Vec<Value>), Error> {
    let mut params = Vec::with_capacity(values.len());
    let mut assignments = Vec::with_capacity(values.len());
    for (field, value) in values {
        assignments.push(format!("{} = ?", quote_identifier(field)?));
        params.push(value.clone());
    }
    let condition = condition(filter, &mut params)?;
    let sql = format!("UPDATE {} SET {} WHERE {condition}", quote_identifier(table)?, assignments.join(", "));
    Ok((sql, params))
}

pub(crate) fn select_statement(table: &str, filter: &Filter, limit: Option<usize>) -> Result<(String, Vec<Value>), Error> {
    let mut params = Vec::new();
    let condition = condition(filter, &mut params)?;
    let mut sql = format!("SELECT * FROM {} WHERE {condition}", quote_identifier(table)?);
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        params.push(Value::from(limit));
    }
    Ok((sql, params))
}

pub(crate) fn insert_statement(table: &str, row: &Row) -> Result<(String, Vec<Value>), Error> {
    let columns = row
        .keys()
        .map(|k| quote_identifier(k))
        .collect::<Result<Vec<_>, Error>>()?;
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!("INSERT INTO {} ({}) VALUES ({placeholders})", quote_identifier(table)?, columns.join(", "));
    Ok((sql, row.values().cloned().collect()))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Timestamp(ts) => ToSqlOutput::Owned(SqlValue::Text(ts.to_rfc3339())),
            Value::Json(json) => ToSqlOutput::Owned(SqlValue::Text(json.to_string())),
            Value::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
        };
        Ok(output)
    }
}

pub(crate) fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

pub(crate) fn read_row(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (index, name) in columns.iter().enumerate() {
        out.insert(name.clone(), value_from_ref(row.get_ref(index)?));
    }
    Ok(out)
}
