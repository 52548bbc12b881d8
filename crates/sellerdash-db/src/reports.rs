//! Database operations for the per-report-type tables.
//!
//! Column lists are driven by the [`SchemaDescriptor`], so one set of
//! functions serves all four report tables. Identifiers come from the static
//! type registry and are quoted, never taken from user input.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sellerdash_core::{
    ColumnSpec, NaturalKey, ReportFilter, ReportRow, SchemaDescriptor, SemanticType, Value,
    STORE_ID_COLUMN,
};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, PgPool, Postgres, Row};

use crate::DbError;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

// ---------------------------------------------------------------------------
// SQL assembly
// ---------------------------------------------------------------------------

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn select_list(descriptor: &SchemaDescriptor) -> String {
    let mut columns: Vec<String> = descriptor.columns.iter().map(|c| quote(c.name)).collect();
    columns.push("created_at".to_string());
    columns.push("updated_at".to_string());
    columns.join(", ")
}

fn key_columns<'a>(descriptor: &'a SchemaDescriptor) -> Result<Vec<&'a ColumnSpec>, DbError> {
    descriptor
        .natural_key
        .iter()
        .map(|name| {
            descriptor
                .column(name)
                .ok_or_else(|| DbError::MissingKeyColumn((*name).to_string()))
        })
        .collect()
}

/// `store_id = $first AND "k1" = $first+1 AND ...`
fn key_predicate(key_columns: &[&ColumnSpec], first: usize) -> String {
    let mut clauses = vec![format!("store_id = ${first}")];
    clauses.extend(
        key_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ${}", quote(c.name), first + 1 + i)),
    );
    clauses.join(" AND ")
}

/// `INSERT ... ON CONFLICT (store_id, key...) DO UPDATE` over every column.
fn upsert_sql(descriptor: &SchemaDescriptor, key_columns: &[&ColumnSpec]) -> String {
    let columns: Vec<String> = descriptor.columns.iter().map(|c| quote(c.name)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();

    let mut conflict_target = vec![quote(STORE_ID_COLUMN)];
    conflict_target.extend(key_columns.iter().map(|c| quote(c.name)));

    let mut assignments: Vec<String> = descriptor
        .non_key_columns()
        .map(|c| format!("{0} = EXCLUDED.{0}", quote(c.name)))
        .collect();
    assignments.push("updated_at = NOW()".to_string());

    // xmax is zero only on a freshly inserted tuple.
    format!(
        "INSERT INTO {} ({}) VALUES ({}) \
         ON CONFLICT ({}) DO UPDATE SET {} \
         RETURNING {}, (xmax = 0) AS inserted",
        descriptor.table_name(),
        columns.join(", "),
        placeholders.join(", "),
        conflict_target.join(", "),
        assignments.join(", "),
        select_list(descriptor),
    )
}

// ---------------------------------------------------------------------------
// Value binding and decoding
// ---------------------------------------------------------------------------

fn bind_value<'q>(
    query: PgQuery<'q>,
    column: &ColumnSpec,
    value: &Value,
) -> Result<PgQuery<'q>, DbError> {
    let mismatch = || DbError::InvalidColumnValue {
        column: column.name.to_string(),
        reason: format!("expected {}, got {value:?}", column.semantic_type),
    };

    if value.is_null() {
        return Ok(match column.semantic_type {
            SemanticType::Int => query.bind(None::<i64>),
            SemanticType::Decimal => query.bind(None::<Decimal>),
            SemanticType::Date => query.bind(None::<NaiveDate>),
            SemanticType::Bool => query.bind(None::<bool>),
            SemanticType::String => query.bind(None::<String>),
        });
    }

    Ok(match column.semantic_type {
        SemanticType::Int => query.bind(value.as_i64().ok_or_else(mismatch)?),
        SemanticType::Decimal => query.bind(value.as_decimal().ok_or_else(mismatch)?),
        SemanticType::Date => query.bind(value.as_date().ok_or_else(mismatch)?),
        SemanticType::Bool => match value {
            Value::Bool(b) => query.bind(*b),
            _ => return Err(mismatch()),
        },
        SemanticType::String => query.bind(value.to_string()),
    })
}

fn decode_value(row: &PgRow, column: &ColumnSpec) -> Result<Value, DbError> {
    let name = column.name;
    let value = match column.semantic_type {
        SemanticType::Int => Value::from(row.try_get::<Option<i64>, _>(name)?),
        SemanticType::Decimal => Value::from(row.try_get::<Option<Decimal>, _>(name)?),
        SemanticType::Date => Value::from(row.try_get::<Option<NaiveDate>, _>(name)?),
        SemanticType::Bool => Value::from(row.try_get::<Option<bool>, _>(name)?),
        SemanticType::String => Value::from(row.try_get::<Option<String>, _>(name)?),
    };
    Ok(value)
}

fn decode_report_row(row: &PgRow, descriptor: &SchemaDescriptor) -> Result<ReportRow, DbError> {
    let values = descriptor
        .columns
        .iter()
        .map(|c| decode_value(row, c).map(|v| (c.name.to_string(), v)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(ReportRow {
        store_id: row.try_get::<i64, _>(STORE_ID_COLUMN)?,
        values,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn bind_key<'q>(
    mut query: PgQuery<'q>,
    key_columns: &[&ColumnSpec],
    key: &NaturalKey,
) -> Result<PgQuery<'q>, DbError> {
    if key.values.len() != key_columns.len() {
        return Err(DbError::InvalidColumnValue {
            column: STORE_ID_COLUMN.to_string(),
            reason: format!(
                "natural key has {} values, schema declares {}",
                key.values.len(),
                key_columns.len()
            ),
        });
    }
    query = query.bind(key.store_id);
    for (column, value) in key_columns.iter().zip(&key.values) {
        query = bind_value(query, column, value)?;
    }
    Ok(query)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Fetches the row identified by `key` and locks it for the rest of the
/// transaction with `SELECT ... FOR UPDATE`.
///
/// Returns `Ok(None)` if no row matches.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::InvalidColumnValue`] if a key value does not fit its column.
pub async fn find_report_row_for_update(
    conn: &mut PgConnection,
    descriptor: &SchemaDescriptor,
    key: &NaturalKey,
) -> Result<Option<ReportRow>, DbError> {
    let key_columns = key_columns(descriptor)?;
    let sql = format!(
        "SELECT {} FROM {} WHERE {} FOR UPDATE",
        select_list(descriptor),
        descriptor.table_name(),
        key_predicate(&key_columns, 1),
    );
    let query = bind_key(sqlx::query(&sql), &key_columns, key)?;
    let row = query.fetch_optional(&mut *conn).await?;
    row.map(|r| decode_report_row(&r, descriptor)).transpose()
}

/// A report row written by [`upsert_report_row`].
#[derive(Debug, Clone)]
pub struct UpsertedRow {
    pub row: ReportRow,
    /// `false` when an existing row with the same key was overwritten.
    pub inserted: bool,
}

/// Inserts a report row, or overwrites the non-key columns of the row that
/// already holds its `(store_id, natural key)`.
///
/// A single `INSERT ... ON CONFLICT DO UPDATE` statement, so concurrent
/// writers of the same new key serialize on the unique index instead of
/// failing. New rows get `created_at = updated_at = NOW()`; overwritten rows
/// keep `created_at` and get `updated_at = NOW()`. `store_id` overrides any
/// `store_id` entry in `values`; columns absent from `values` are written as
/// `NULL`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails,
/// [`DbError::MissingKeyColumn`] if the descriptor names an unknown key
/// column, or [`DbError::InvalidColumnValue`] on a type mismatch.
pub async fn upsert_report_row(
    conn: &mut PgConnection,
    descriptor: &SchemaDescriptor,
    store_id: i64,
    values: &BTreeMap<String, Value>,
) -> Result<UpsertedRow, DbError> {
    let sql = upsert_sql(descriptor, &key_columns(descriptor)?);

    let mut query = sqlx::query(&sql);
    for column in &descriptor.columns {
        query = if column.name == STORE_ID_COLUMN {
            query.bind(store_id)
        } else {
            bind_value(query, column, values.get(column.name).unwrap_or(&Value::Null))?
        };
    }

    let row = query.fetch_one(&mut *conn).await?;
    Ok(UpsertedRow {
        inserted: row.try_get::<bool, _>("inserted")?,
        row: decode_report_row(&row, descriptor)?,
    })
}

/// Returns the rows of one store matching `filter`, ordered by the
/// descriptor's date column and then insertion order.
///
/// A `sku`/`asin` filter on a report type without that column matches
/// nothing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn query_report_rows(
    pool: &PgPool,
    descriptor: &SchemaDescriptor,
    store_id: i64,
    filter: &ReportFilter,
) -> Result<Vec<ReportRow>, DbError> {
    let has_column = |name: &str| descriptor.column(name).is_some();
    if (filter.sku.is_some() && !has_column("sku")) || (filter.asin.is_some() && !has_column("asin"))
    {
        return Ok(Vec::new());
    }

    let date_column = quote(descriptor.date_column);
    let mut clauses = vec!["store_id = $1".to_string()];
    let mut next = 2;
    let mut push = |clause: String| {
        clauses.push(clause.replace('?', &format!("${next}")));
        next += 1;
    };
    if filter.start_date.is_some() {
        push(format!("{date_column} >= ?"));
    }
    if filter.end_date.is_some() {
        push(format!("{date_column} <= ?"));
    }
    if filter.sku.is_some() {
        push("\"sku\" = ?".to_string());
    }
    if filter.asin.is_some() {
        push("\"asin\" = ?".to_string());
    }

    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {date_column}, id",
        select_list(descriptor),
        descriptor.table_name(),
        clauses.join(" AND "),
    );

    let mut query = sqlx::query(&sql).bind(store_id);
    if let Some(start) = filter.start_date {
        query = query.bind(start);
    }
    if let Some(end) = filter.end_date {
        query = query.bind(end);
    }
    if let Some(sku) = &filter.sku {
        query = query.bind(sku.clone());
    }
    if let Some(asin) = &filter.asin {
        query = query.bind(asin.clone());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter()
        .map(|r| decode_report_row(r, descriptor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sellerdash_core::{ReportType, TypeRegistry};

    #[test]
    fn key_predicate_numbers_placeholders_from_offset() {
        let registry = TypeRegistry::default();
        let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
        let columns = key_columns(descriptor).unwrap();
        assert_eq!(
            key_predicate(&columns, 4),
            "store_id = $4 AND \"date\" = $5 AND \"sku\" = $6 AND \"asin\" = $7"
        );
    }

    #[test]
    fn select_list_includes_timestamps_in_template_order() {
        let registry = TypeRegistry::default();
        let descriptor = registry.descriptor_for(ReportType::Returns).unwrap();
        let list = select_list(descriptor);
        assert!(list.starts_with("\"store_id\", \"return_date\", \"order_id\""));
        assert!(list.ends_with("created_at, updated_at"));
    }

    #[test]
    fn upsert_targets_the_natural_key_index_and_skips_key_columns() {
        let registry = TypeRegistry::default();
        let descriptor = registry.descriptor_for(ReportType::Business).unwrap();
        let sql = upsert_sql(descriptor, &key_columns(descriptor).unwrap());

        assert!(sql.starts_with("INSERT INTO business_reports (\"store_id\", \"date\""));
        assert!(sql.contains("VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"));
        assert!(sql.contains("ON CONFLICT (\"store_id\", \"date\", \"sku\", \"asin\") DO UPDATE SET"));
        assert!(sql.contains("\"sessions\" = EXCLUDED.\"sessions\""));
        assert!(!sql.contains("\"sku\" = EXCLUDED"));
        assert!(!sql.contains("created_at = "));
        assert!(sql.contains("updated_at = NOW()"));
        assert!(sql.ends_with("created_at, updated_at, (xmax = 0) AS inserted"));
    }
}
