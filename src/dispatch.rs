//! Dispatcher: maps a parsed request onto one parameterized store operation
//!
//! The `(kind, entity)` table:
//!
//! | kind   | entity                      | payload                      |
//! |--------|-----------------------------|------------------------------|
//! | insert | student, professor          | column values in table order |
//! | insert | course                      | always fails in the store    |
//! | select | student, professor          | optional `[column, value]`   |
//! | delete | student, professor, course  | required `[column, value]`   |
//!
//! Everything else is rejected before the store is touched. Filter column
//! names are checked against the entity's schema columns; the compared value
//! is always a bound parameter.

use std::time::Instant;

use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{QueryError, Result};
use crate::metrics::Metrics;
use crate::query::{self, Filter, QueryKind, Request, Response, Row};
use crate::schema::Entity;
use crate::store::Store;

/// A resolved entry of the operation table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert { entity: Entity, sql: &'static str },
    Select(Entity),
    Delete(Entity),
}

impl Operation {
    /// Look up `(kind, target)`. `None` means the pair is not supported.
    pub fn lookup(kind: &QueryKind, target: &str) -> Option<Self> {
        let entity = Entity::from_name(target)?;
        match (kind, entity) {
            (QueryKind::Insert, Entity::Student) => Some(Operation::Insert {
                entity,
                sql: "INSERT INTO Students VALUES (?1, ?2, ?3, ?4, ?5)",
            }),
            (QueryKind::Insert, Entity::Professor) => Some(Operation::Insert {
                entity,
                sql: "INSERT INTO Professors VALUES (?1, ?2, ?3, ?4, ?5)",
            }),
            // A table name cannot be a bound parameter, so SQLite refuses to
            // prepare this. Course inserts always end in a store error.
            (QueryKind::Insert, Entity::Course) => Some(Operation::Insert {
                entity,
                sql: "INSERT INTO ? VALUES (?)",
            }),
            (QueryKind::Select, Entity::Student | Entity::Professor) => {
                Some(Operation::Select(entity))
            }
            (QueryKind::Delete, Entity::Student | Entity::Professor | Entity::Course) => {
                Some(Operation::Delete(entity))
            }
            _ => None,
        }
    }

    pub fn entity(&self) -> Entity {
        match self {
            Operation::Insert { entity, .. } => *entity,
            Operation::Select(entity) | Operation::Delete(entity) => *entity,
        }
    }

    /// Operation name used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "Insert",
            Operation::Select(_) => "Select",
            Operation::Delete(_) => "Delete",
        }
    }
}

/// A fully validated statement, ready to run
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub operation: Operation,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Plan {
    /// Build the statement for a request without touching the store.
    pub fn for_request(request: &Request) -> Result<Self> {
        let operation = Operation::lookup(&request.kind, &request.target).ok_or_else(|| {
            QueryError::Unsupported(format!("{} on '{}'", request.kind.as_str(), request.target))
        })?;
        let entity = operation.entity();

        match operation {
            Operation::Insert { sql, .. } => {
                let params = request
                    .payload
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(to_sql_value)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Plan {
                    operation,
                    sql: sql.to_string(),
                    params,
                })
            }
            Operation::Select(_) => match request.filter()? {
                Some(filter) => {
                    let (clause, value) = where_clause(entity, &filter)?;
                    Ok(Plan {
                        operation,
                        sql: format!("SELECT * FROM {} {}", entity.table(), clause),
                        params: vec![value],
                    })
                }
                None => Ok(Plan {
                    operation,
                    sql: format!("SELECT * FROM {}", entity.table()),
                    params: Vec::new(),
                }),
            },
            Operation::Delete(_) => {
                let filter = request.filter()?.ok_or_else(|| {
                    QueryError::InvalidPayload(
                        "delete requires a [column, value] filter".to_string(),
                    )
                })?;
                let (clause, value) = where_clause(entity, &filter)?;
                Ok(Plan {
                    operation,
                    sql: format!("DELETE FROM {} {}", entity.table(), clause),
                    params: vec![value],
                })
            }
        }
    }
}

fn where_clause(entity: Entity, filter: &Filter) -> Result<(String, SqlValue)> {
    let column = entity.column(&filter.column).ok_or_else(|| {
        QueryError::Unsupported(format!(
            "unknown column '{}' for {}",
            filter.column,
            entity.as_str()
        ))
    })?;
    Ok((format!("WHERE {} = ?1", column), to_sql_value(&filter.value)?))
}

/// What a successful operation produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Rows(Vec<Row>),
    Affected(usize),
}

impl From<Outcome> for Response {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Rows(rows) => Response::rows(rows),
            Outcome::Affected(_) => Response::ok(),
        }
    }
}

/// Run a plan as one auto-committing unit.
pub fn execute(store: &Store, plan: &Plan) -> Result<Outcome> {
    store.execute(|tx| {
        let params = rusqlite::params_from_iter(plan.params.iter());
        match plan.operation {
            Operation::Select(_) => {
                let mut stmt = tx.prepare(&plan.sql)?;
                let width = stmt.column_count();
                let mut rows = stmt.query(params)?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut values = Vec::with_capacity(width);
                    for i in 0..width {
                        values.push(to_json_value(row.get_ref(i)?));
                    }
                    out.push(values);
                }
                Ok(Outcome::Rows(out))
            }
            Operation::Insert { .. } | Operation::Delete(_) => {
                Ok(Outcome::Affected(tx.execute(&plan.sql, params)?))
            }
        }
    })
}

/// Parse, plan and execute one request body, producing the client response.
///
/// The underlying cause of any failure is logged here and never leaves the
/// server.
pub fn handle_message(store: &Store, body: &[u8], metrics: Option<&Metrics>) -> Response {
    let start = Instant::now();

    let (op_name, result) = match query::parse(body) {
        Err(e) => ("Unparsed", Err(e)),
        Ok(request) => match Plan::for_request(&request) {
            Err(e) => (
                Operation::lookup(&request.kind, &request.target)
                    .map_or("Unsupported", |op| op.name()),
                Err(e),
            ),
            Ok(plan) => {
                debug!(operation = plan.operation.name(), sql = %plan.sql, "executing");
                (plan.operation.name(), execute(store, &plan))
            }
        },
    };

    if let Some(m) = metrics {
        m.record_request(op_name, result.as_ref().err().map(QueryError::code), start.elapsed());
    }

    match result {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            match &e {
                QueryError::Parse(_) | QueryError::Unsupported(_) => {
                    debug!(operation = op_name, code = e.code(), error = %e, "request rejected");
                }
                _ => {
                    warn!(operation = op_name, code = e.code(), error = %e, "request failed");
                }
            }
            Response::error(&e)
        }
    }
}

fn to_sql_value(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(SqlValue::Integer(i)),
            (None, Some(f)) => Ok(SqlValue::Real(f)),
            (None, None) => Err(QueryError::InvalidPayload(format!("unrepresentable number {}", n))),
        },
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(QueryError::InvalidPayload(
            "column values must be scalars".to_string(),
        )),
    }
}

fn to_json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}
