// ABOUTME: Minimal row access for owning tables, driven by their TableSchema.
// ABOUTME: Creates the table and inserts, updates, selects and deletes entities by primary key.

use revisor_core::{Entity, TableSchema, Value};
use rusqlite::{Connection, params_from_iter};

use crate::db::{from_sql, placeholders, quote_ident, to_sql};
use crate::error::StoreError;

pub(crate) fn create_table(
    conn: &Connection,
    schema: &TableSchema,
    primary_key: &str,
) -> Result<(), StoreError> {
    let columns: Vec<String> = schema
        .columns()
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote_ident(&c.name), c.kind.sql_type());
            if c.name == primary_key {
                def.push_str(" PRIMARY KEY");
            }
            def
        })
        .collect();

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quote_ident(schema.name()),
        columns.join(", ")
    ))?;
    Ok(())
}

/// Insert the entity's schema columns. Returns the primary key, taken from
/// the entity or, when it has none, from the generated rowid.
pub(crate) fn insert(
    conn: &Connection,
    schema: &TableSchema,
    primary_key: &str,
    entity: &Entity,
) -> Result<Value, StoreError> {
    let values: Vec<(&str, &Value)> = schema
        .columns()
        .iter()
        .filter_map(|c| entity.get(&c.name).map(|v| (c.name.as_str(), v)))
        .filter(|(name, value)| !(*name == primary_key && value.is_null()))
        .collect();

    let table = quote_ident(schema.name());
    if values.is_empty() {
        conn.execute(&format!("INSERT INTO {table} DEFAULT VALUES"), [])?;
    } else {
        let names: Vec<String> = values.iter().map(|(name, _)| quote_ident(name)).collect();
        conn.execute(
            &format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                names.join(", "),
                placeholders(values.len())
            ),
            params_from_iter(values.iter().map(|(_, v)| to_sql(v))),
        )?;
    }

    match entity.get(primary_key) {
        Some(key) if !key.is_null() => Ok(key.clone()),
        _ => Ok(Value::Integer(conn.last_insert_rowid())),
    }
}

/// Write the entity's non-key schema columns to the row with `key`.
pub(crate) fn update(
    conn: &Connection,
    schema: &TableSchema,
    primary_key: &str,
    key: &Value,
    entity: &Entity,
) -> Result<(), StoreError> {
    let values: Vec<(&str, &Value)> = schema
        .columns()
        .iter()
        .filter(|c| c.name != primary_key)
        .filter_map(|c| entity.get(&c.name).map(|v| (c.name.as_str(), v)))
        .collect();

    let table = quote_ident(schema.name());
    let sql = if values.is_empty() {
        format!(
            "UPDATE {table} SET {pk} = {pk} WHERE {pk} = ?",
            pk = quote_ident(primary_key)
        )
    } else {
        let assignments: Vec<String> = values
            .iter()
            .map(|(name, _)| format!("{} = ?", quote_ident(name)))
            .collect();
        format!(
            "UPDATE {table} SET {} WHERE {} = ?",
            assignments.join(", "),
            quote_ident(primary_key)
        )
    };

    let mut params: Vec<_> = values.iter().map(|(_, v)| to_sql(v)).collect();
    params.push(to_sql(key));

    let updated = conn.execute(&sql, params_from_iter(params.iter()))?;
    if updated == 0 {
        return Err(StoreError::RecordNotFound {
            table: schema.name().to_string(),
            key: key.clone(),
        });
    }
    Ok(())
}

/// Load entities by key, or every row when `keys` is None. Rows come back
/// in primary key order.
pub(crate) fn select(
    conn: &Connection,
    schema: &TableSchema,
    primary_key: &str,
    keys: Option<&[Value]>,
) -> Result<Vec<Entity>, StoreError> {
    let names: Vec<String> = schema.columns().iter().map(|c| quote_ident(&c.name)).collect();
    let pk = quote_ident(primary_key);
    let mut sql = format!("SELECT {} FROM {}", names.join(", "), quote_ident(schema.name()));
    let mut params = Vec::new();

    if let Some(keys) = keys {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        sql.push_str(&format!(" WHERE {pk} IN ({})", placeholders(keys.len())));
        params.extend(keys.iter().map(to_sql));
    }
    sql.push_str(&format!(" ORDER BY {pk}"));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        let mut values = Vec::with_capacity(schema.columns().len());
        for (idx, column) in schema.columns().iter().enumerate() {
            values.push((
                column.name.clone(),
                from_sql(row.get_ref(idx)?, Some(column.kind)),
            ));
        }
        Ok(Entity::hydrate(values))
    })?;

    let mut entities = Vec::new();
    for row in rows {
        entities.push(row?);
    }
    Ok(entities)
}

pub(crate) fn delete(
    conn: &Connection,
    schema: &TableSchema,
    primary_key: &str,
    key: &Value,
) -> Result<usize, StoreError> {
    Ok(conn.execute(
        &format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(schema.name()),
            quote_ident(primary_key)
        ),
        [to_sql(key)],
    )?)
}
