//! Conjunctive equality queries over typed attributes.
//!
//! # Responsibility
//! - Render `WHERE a IS ?1 AND b IS ?2 ...` clauses from typed criteria.
//! - Execute count and result-list queries for any [`QueryTarget`].
//!
//! # Invariants
//! - Column names come only from [`Attribute::column`], never from input.
//! - Comparisons use `IS`, so a `NULL` comparison matches `NULL` columns.
//! - An empty criteria list selects every row of the table.

use super::RepoResult;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

/// Queryable column of one table.
pub trait Attribute: Copy {
    fn column(self) -> &'static str;
}

/// Row type that can be loaded through criteria queries.
pub trait QueryTarget: Sized {
    type Attribute: Attribute;

    const TABLE: &'static str;
    const COLUMNS: &'static str;
    const ORDER_BY: &'static str;

    fn from_row(row: &Row<'_>) -> RepoResult<Self>;
}

/// One `attribute == comparison` constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualsCriterion<A> {
    attribute: A,
    comparison: Value,
}

impl<A: Attribute> EqualsCriterion<A> {
    pub fn text(attribute: A, comparison: &str) -> Self {
        Self {
            attribute,
            comparison: Value::Text(comparison.to_string()),
        }
    }

    pub fn nullable_text(attribute: A, comparison: Option<&str>) -> Self {
        Self {
            attribute,
            comparison: comparison.map_or(Value::Null, |value| Value::Text(value.to_string())),
        }
    }

    pub fn attribute(&self) -> A {
        self.attribute
    }

    pub fn comparison(&self) -> &Value {
        &self.comparison
    }
}

/// Renders the `WHERE` clause (with a leading space) for `criteria`.
pub fn render_where<A: Attribute>(criteria: &[EqualsCriterion<A>]) -> String {
    let clauses = criteria
        .iter()
        .enumerate()
        .map(|(index, criterion)| format!("{} IS ?{}", criterion.attribute.column(), index + 1))
        .collect::<Vec<_>>();

    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

/// Counts rows of `T` matching all criteria.
pub fn count<T: QueryTarget>(
    conn: &Connection,
    criteria: &[EqualsCriterion<T::Attribute>],
) -> RepoResult<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}{};", T::TABLE, render_where(criteria));
    let total: i64 = conn.query_row(
        &sql,
        params_from_iter(criteria.iter().map(EqualsCriterion::comparison)),
        |row| row.get(0),
    )?;
    Ok(total.unsigned_abs())
}

/// Loads rows of `T` matching all criteria in `T::ORDER_BY` order.
pub fn result_list<T: QueryTarget>(
    conn: &Connection,
    criteria: &[EqualsCriterion<T::Attribute>],
) -> RepoResult<Vec<T>> {
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY {};",
        T::COLUMNS,
        T::TABLE,
        render_where(criteria),
        T::ORDER_BY
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(
        criteria.iter().map(EqualsCriterion::comparison),
    ))?;

    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(T::from_row(row)?);
    }
    Ok(items)
}
