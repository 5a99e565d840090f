//! Turns a statement into SQL.
//!
//! Every builder here is pure: it reads the statement, works on a copy of
//! its clauses, and returns the rendered SQL and bound values. Composing the
//! same statement twice gives the same output.

use crate::config::CreateConfig;
use crate::schema::{Field, JoinTable, Relationship, RelationshipKind, Schema, schema_error};
use crate::statement::{Dest, Statement};
use ormline_core::{Error, RelationError, RelationErrorKind, Result, SchemaErrorKind, Value};
use ormline_query::clause::From as FromClause;
use ormline_query::{
    Assignment, CREATE_CLAUSES, Clause, ClauseKind, Clauses, Column, DELETE_CLAUSES, Delete,
    Dialect, Expr, Insert, Join, OnConflict, QUERY_CLAUSES, Returning, Select, Set, SqlWriter,
    TableRef, UPDATE_CLAUSES, Update, Values, Where,
};
use std::collections::HashSet;

/// Separator between a joined relationship's name and its column in
/// result column aliases.
pub const JOIN_ALIAS_SEPARATOR: &str = "__";

/// Rendered SQL and its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct Composed {
    pub sql: String,
    pub vars: Vec<Value>,
}

fn render(clauses: &Clauses, order: &[ClauseKind], dialect: Dialect, table: &str) -> Composed {
    let mut w = SqlWriter::new(dialect, table);
    clauses.build(order, &mut w);
    let (sql, vars) = w.finish();
    Composed { sql, vars }
}

fn statement_table(stmt: &Statement) -> Result<&str> {
    if stmt.table.is_empty() {
        let model = stmt.model.map_or("", |m| m.type_name());
        return Err(schema_error(
            SchemaErrorKind::MissingTable,
            model,
            "statement has neither a model nor a table",
        ));
    }
    Ok(&stmt.table)
}

fn relation_error(kind: RelationErrorKind, relation: &str, message: impl Into<String>) -> Error {
    Error::Relation(RelationError {
        kind,
        relation: relation.to_string(),
        message: message.into(),
    })
}

/// Equality on the non-zero primary keys of the destination record.
///
/// With `many`, a batch destination with a single primary key becomes an
/// `IN` over its non-zero keys.
fn primary_key_conditions(stmt: &Statement, many: bool) -> Vec<Expr> {
    let Some(schema) = stmt.schema.as_deref() else {
        return Vec::new();
    };
    match &stmt.dest {
        Dest::One(record) => schema
            .primary_fields()
            .filter_map(|f| {
                let value = record.value(&f.name);
                (!value.is_zero()).then(|| Expr::eq(Column::current(&f.column), value.clone()))
            })
            .collect(),
        Dest::Many(records) if many && schema.primary_fields.len() == 1 => {
            let Some(pk) = schema.prioritized_primary_field() else {
                return Vec::new();
            };
            let values: Vec<Value> = records
                .iter()
                .map(|r| r.value(&pk.name))
                .filter(|v| !v.is_zero())
                .cloned()
                .collect();
            if values.is_empty() {
                Vec::new()
            } else {
                vec![Expr::in_list(Column::current(&pk.column), values)]
            }
        }
        _ => Vec::new(),
    }
}

/// Map field names and the primary-key placeholder to column names.
fn resolve_column(column: &mut Column, schema: Option<&Schema>) {
    if column.raw {
        return;
    }
    let Some(schema) = schema else {
        if column.is_primary_key() {
            column.name = "id".to_string();
        }
        return;
    };

    let named = match &column.table {
        Some(TableRef::Named(table)) => Some(table.clone()),
        _ => None,
    };
    if let Some(table) = named {
        if table == schema.name {
            column.table = Some(TableRef::Current);
        } else {
            if let Some(field) = schema
                .relationship(&table)
                .and_then(|rel| rel.target_field(&column.name))
            {
                column.name = field.column.clone();
            }
            return;
        }
    }

    if column.is_primary_key() {
        if let Some(pk) = schema.prioritized_primary_field() {
            column.name = pk.column.clone();
        }
    } else if let Some(field) = schema.field(&column.name) {
        column.name = field.column.clone();
    }
}

fn resolve_columns(clauses: &mut Clauses, schema: Option<&Schema>) {
    clauses.map_columns(&|column: &mut Column| resolve_column(column, schema));
}

/// A column named in `select()`: a field or `Rel.Field`, else raw SQL.
fn select_column(schema: Option<&Schema>, name: &str) -> Column {
    let Some(schema) = schema else {
        return Column::raw(name);
    };
    if let Some((rel, field)) = name.split_once('.') {
        if let Some(rel) = schema.relationship(rel) {
            if let Some(f) = rel.target_field(field).or_else(|| rel.target_field_by_column(field)) {
                return Column::qualified(&rel.name, &f.column);
            }
        }
        return Column::raw(name);
    }
    match schema.lookup(name) {
        Some(field) => Column::current(&field.column),
        None => Column::raw(name),
    }
}

pub(crate) fn names_field(names: &[String], field: &Field) -> bool {
    names.iter().any(|n| *n == field.name || *n == field.column)
}

/// ON conditions for joining `rel` under its own name.
fn join_conditions(rel: &Relationship) -> Vec<Expr> {
    rel.references
        .iter()
        .filter_map(|r| match (&r.primary_key, &r.primary_value) {
            (_, Some(value)) => Some(Expr::eq(
                Column::qualified(&rel.name, &r.foreign_key.column),
                value.clone(),
            )),
            (Some(pk), None) if r.own_primary_key => Some(Expr::eq_column(
                Column::current(&pk.column),
                Column::qualified(&rel.name, &r.foreign_key.column),
            )),
            (Some(pk), None) => Some(Expr::eq_column(
                Column::current(&r.foreign_key.column),
                Column::qualified(&rel.name, &pk.column),
            )),
            (None, None) => None,
        })
        .collect()
}

/// The joins a statement requested and the aliased columns they add.
fn build_joins(stmt: &Statement, table: &str) -> Result<(FromClause, Vec<Column>)> {
    let schema = stmt.schema.as_deref();
    let mut from = FromClause::default();
    let mut columns = Vec::new();
    let mut aliases = HashSet::from([table.to_string()]);
    let mut column_aliases = HashSet::new();

    for request in &stmt.joins {
        let Some(rel) = schema.and_then(|s| s.relationship(&request.name)) else {
            from.joins.push(Join::raw(Expr::raw(
                request.name.clone(),
                request.args.clone(),
            )));
            continue;
        };
        if rel.kind == RelationshipKind::ManyToMany {
            return Err(relation_error(
                RelationErrorKind::UnsupportedJoin,
                &rel.name,
                format!("{}: many-to-many relationships are preloaded, not joined", rel.name),
            ));
        }
        if !aliases.insert(rel.name.clone()) {
            return Err(relation_error(
                RelationErrorKind::AliasCollision,
                &rel.name,
                format!("join alias {} is already in use", rel.name),
            ));
        }
        from.joins.push(
            Join::left(rel.target_table.clone(), join_conditions(rel)).alias(rel.name.clone()),
        );

        for column in rel.target_columns() {
            let alias = format!("{}{JOIN_ALIAS_SEPARATOR}{column}", rel.name);
            if !column_aliases.insert(alias.clone()) {
                return Err(relation_error(
                    RelationErrorKind::AliasCollision,
                    &rel.name,
                    format!("column alias {alias} is already in use"),
                ));
            }
            columns.push(Column::qualified(&rel.name, column).alias(alias));
        }
    }
    Ok((from, columns))
}

/// Build the SELECT for a query statement.
pub fn build_query_sql(stmt: &Statement, dialect: Dialect) -> Result<Composed> {
    let table = statement_table(stmt)?;
    let schema = stmt.schema.as_deref();
    let mut clauses = stmt.clauses.clone();

    let conditions = primary_key_conditions(stmt, false);
    if !conditions.is_empty() {
        clauses.add(Where::new(conditions));
    }

    let mut select = (!stmt.selects.is_empty()).then(|| {
        Select::columns(stmt.selects.iter().map(|s| select_column(schema, s)).collect())
    });

    let (from, joined_columns) = build_joins(stmt, table)?;
    if select.is_none() && !clauses.contains(ClauseKind::Select) {
        if !joined_columns.is_empty() {
            let mut columns: Vec<Column> = match schema {
                Some(schema) => schema
                    .fields
                    .iter()
                    .map(|f| Column::current(&f.column))
                    .collect(),
                None => vec![Column::current("*")],
            };
            columns.extend(joined_columns);
            select = Some(Select::columns(columns));
        } else if let (false, Some(schema)) = (stmt.omits.is_empty(), schema) {
            select = Some(Select::columns(
                schema
                    .fields
                    .iter()
                    .filter(|f| !names_field(&stmt.omits, f))
                    .map(|f| Column::current(&f.column))
                    .collect(),
            ));
        }
    }

    if let Some(select) = select {
        clauses.add(select);
    }
    clauses.add_if_absent(Select::default());
    if stmt.distinct {
        if let Some(Clause::Select(select)) = clauses.get_mut(ClauseKind::Select) {
            select.distinct = true;
        }
    }
    if from.joins.is_empty() {
        clauses.add_if_absent(FromClause::default());
    } else {
        clauses.add(from);
    }

    resolve_columns(&mut clauses, schema);
    Ok(render(&clauses, QUERY_CLAUSES, dialect, table))
}

/// The primary key the INSERT should return, if any.
pub fn returned_primary_key<'s>(
    schema: &'s Schema,
    dialect: Dialect,
    config: &CreateConfig,
) -> Option<&'s Field> {
    if !config.with_returning || !dialect.supports_returning() {
        return None;
    }
    schema.prioritized_primary_field().filter(|f| f.auto_increment)
}

/// Build the INSERT for the destination records.
///
/// A field with a database default is left out when it is zero in every
/// record, and written as `DEFAULT` where it is zero in a mixed batch.
pub fn build_create_sql(
    stmt: &Statement,
    dialect: Dialect,
    config: &CreateConfig,
) -> Result<Composed> {
    let table = statement_table(stmt)?;
    let schema = stmt
        .schema
        .as_deref()
        .ok_or_else(|| schema_error(SchemaErrorKind::Invalid, table, "create needs a model"))?;
    let records = stmt.dest.records();
    if records.is_empty() {
        return Err(Error::Custom(format!("{table}: no records to create")));
    }

    let fields: Vec<&Field> = schema
        .fields
        .iter()
        .filter(|f| !f.read_only)
        .filter(|f| stmt.selects.is_empty() || names_field(&stmt.selects, f))
        .filter(|f| !names_field(&stmt.omits, f))
        .filter(|f| !(f.has_default && records.iter().all(|r| r.is_zero(&f.name))))
        .collect();
    let rows = records
        .iter()
        .map(|record| {
            fields
                .iter()
                .map(|f| {
                    let value = record.value(&f.name);
                    if f.has_default && value.is_zero() {
                        Value::Default
                    } else {
                        value.clone()
                    }
                })
                .collect()
        })
        .collect();

    let mut clauses = stmt.clauses.clone();
    clauses.add_if_absent(Insert::default());
    clauses.add(Values {
        columns: fields.iter().map(|f| Column::new(&f.column)).collect(),
        rows,
    });
    if !clauses.contains(ClauseKind::Returning) {
        if let Some(pk) = returned_primary_key(schema, dialect, config) {
            clauses.add(Returning {
                columns: vec![Column::new(&pk.column)],
            });
        }
    }

    resolve_columns(&mut clauses, Some(schema));
    Ok(render(&clauses, CREATE_CLAUSES, dialect, table))
}

/// Build the UPDATE for the statement's assignments.
pub fn build_update_sql(
    stmt: &Statement,
    dialect: Dialect,
    allow_global_update: bool,
) -> Result<Composed> {
    let table = statement_table(stmt)?;
    if stmt.update_values.is_empty() {
        return Err(Error::Custom(format!("{table}: no fields to update")));
    }
    let mut clauses = stmt.clauses.clone();
    let conditions = primary_key_conditions(stmt, false);
    if !conditions.is_empty() {
        clauses.add(Where::new(conditions));
    }
    if !clauses.has_conditions() && !allow_global_update {
        return Err(Error::MissingWhereClause);
    }

    clauses.add_if_absent(Update::default());
    clauses.add(Set {
        assignments: stmt
            .update_values
            .iter()
            .map(|(field, value)| Assignment::new(Column::new(field), value.clone()))
            .collect(),
    });

    resolve_columns(&mut clauses, stmt.schema.as_deref());
    Ok(render(&clauses, UPDATE_CLAUSES, dialect, table))
}

/// Build the DELETE for the destination records and conditions.
pub fn build_delete_sql(
    stmt: &Statement,
    dialect: Dialect,
    allow_global_update: bool,
) -> Result<Composed> {
    let table = statement_table(stmt)?;
    let mut clauses = stmt.clauses.clone();
    let conditions = primary_key_conditions(stmt, true);
    if !conditions.is_empty() {
        clauses.add(Where::new(conditions));
    }
    if !clauses.has_conditions() && !allow_global_update {
        return Err(Error::MissingWhereClause);
    }

    clauses.add_if_absent(Delete::default());
    clauses.add_if_absent(FromClause::default());
    resolve_columns(&mut clauses, stmt.schema.as_deref());
    Ok(render(&clauses, DELETE_CLAUSES, dialect, table))
}

/// Insert link rows into a many-to-many join table, skipping existing ones.
pub fn build_join_rows_sql(
    dialect: Dialect,
    join_table: &JoinTable,
    rows: Vec<Vec<Value>>,
) -> Composed {
    let columns: Vec<Column> = join_table
        .owner_keys
        .iter()
        .chain(&join_table.target_keys)
        .map(|k| Column::new(&k.column))
        .collect();
    let mut on_conflict = OnConflict::do_nothing();
    if dialect == Dialect::Mysql {
        on_conflict.columns = columns.clone();
    }

    let mut clauses = Clauses::new();
    clauses.add(Insert::default());
    clauses.add(Values { columns, rows });
    clauses.add(on_conflict);
    render(&clauses, CREATE_CLAUSES, dialect, &join_table.table)
}
