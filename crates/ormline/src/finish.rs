//! Terminal operations.
//!
//! Each terminal derives its own instance, fills the destination, runs one
//! pipeline and copies the results back into the caller's values.

use crate::callbacks::Operation;
use crate::condition::Condition;
use crate::db::Db;
use crate::schema::{Field, Model, Schema, SchemaRef, schema_error};
use crate::statement::Dest;
use ormline_core::{Cx, Record, Result, Row, SchemaErrorKind, Value};
use ormline_query::{Clause, ClauseKind, Column, Expr, Limit, OnConflict, Operand, OrderBy, Select};

/// What a terminal operation ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub rows_affected: u64,
    pub sql: String,
    pub vars: Vec<Value>,
}

fn writable(field: &&Field) -> bool {
    !field.primary_key && !field.read_only
}

impl Db {
    fn executed(&self) -> Result<Executed> {
        if let Some(e) = self.error() {
            return Err(e.clone());
        }
        let stmt = self.statement();
        Ok(Executed {
            rows_affected: stmt.rows_affected,
            sql: stmt.sql.clone(),
            vars: stmt.vars.clone(),
        })
    }

    /// Copy the single destination record back into `value`.
    fn write_back<M: Model>(&self, value: &mut M) -> Result<()> {
        if let Some(record) = self.statement().dest.records().first() {
            *value = M::from_record(record)?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(model = std::any::type_name::<M>()))]
    pub fn create<M: Model>(&self, cx: &Cx, value: &mut M) -> Result<Executed> {
        let record = value.to_record();
        let mut db = self.model::<M>().edit(|s| s.dest = Dest::One(record));
        db.run(cx, Operation::Create);
        db.write_back(value)?;
        db.executed()
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(model = std::any::type_name::<M>(), count = values.len())
    )]
    pub fn create_batch<M: Model>(&self, cx: &Cx, values: &mut [M]) -> Result<Executed> {
        let records = values.iter().map(Model::to_record).collect();
        let mut db = self.model::<M>().edit(|s| s.dest = Dest::Many(records));
        db.run(cx, Operation::Create);
        for (value, record) in values.iter_mut().zip(db.statement().dest.records()) {
            *value = M::from_record(record)?;
        }
        db.executed()
    }

    /// Every matching record. No ordering is added.
    #[tracing::instrument(level = "debug", skip_all, fields(model = std::any::type_name::<M>()))]
    pub fn find<M: Model>(
        &self,
        cx: &Cx,
        out: &mut Vec<M>,
        conditions: Vec<Condition>,
    ) -> Result<Executed> {
        let mut db = self.model::<M>().edit(|s| {
            s.add_conditions(conditions);
            s.dest = Dest::Many(Vec::new());
        });
        db.run(cx, Operation::Query);
        *out = db
            .statement()
            .dest
            .records()
            .iter()
            .map(M::from_record)
            .collect::<Result<_>>()?;
        db.executed()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(model = std::any::type_name::<M>()))]
    fn find_one<M: Model>(
        &self,
        cx: &Cx,
        out: &mut M,
        conditions: Vec<Condition>,
        order: Option<OrderBy>,
    ) -> Result<Executed> {
        let record = out.to_record();
        let mut db = self.model::<M>().edit(|s| {
            s.add_conditions(conditions);
            if let Some(order) = order {
                s.add_clause(order);
            }
            s.add_clause(Limit {
                limit: Some(1),
                offset: None,
            });
            s.raise_not_found = true;
            s.dest = Dest::One(record);
        });
        db.run(cx, Operation::Query);
        if db.statement().rows_affected > 0 {
            db.write_back(out)?;
        }
        db.executed()
    }

    /// The first record by primary key.
    pub fn first<M: Model>(
        &self,
        cx: &Cx,
        out: &mut M,
        conditions: Vec<Condition>,
    ) -> Result<Executed> {
        self.find_one(cx, out, conditions, Some(OrderBy::asc(Column::primary_key())))
    }

    /// Any one matching record.
    pub fn take<M: Model>(
        &self,
        cx: &Cx,
        out: &mut M,
        conditions: Vec<Condition>,
    ) -> Result<Executed> {
        self.find_one(cx, out, conditions, None)
    }

    /// The last record by primary key.
    pub fn last<M: Model>(
        &self,
        cx: &Cx,
        out: &mut M,
        conditions: Vec<Condition>,
    ) -> Result<Executed> {
        self.find_one(cx, out, conditions, Some(OrderBy::desc(Column::primary_key())))
    }

    /// Create when the primary key is zero, otherwise update every field.
    ///
    /// An update that matches no row falls back to an insert that updates
    /// all fields on conflict.
    #[tracing::instrument(level = "debug", skip_all, fields(model = std::any::type_name::<M>()))]
    pub fn save<M: Model>(&self, cx: &Cx, value: &mut M) -> Result<Executed> {
        let schema = self.schema_of::<M>()?;
        let record = value.to_record();
        if schema.primary_key_is_zero(&record) {
            return self.create(cx, value);
        }

        let assignments = schema
            .fields
            .iter()
            .filter(writable)
            .filter(|f| !f.auto_update_time)
            .map(|f| (f.name.clone(), Operand::Value(record.value(&f.name).clone())))
            .collect();
        let mut db = self.update_with::<M>(record, assignments);
        db.run(cx, Operation::Update);
        if db.error().is_none() && db.statement().rows_affected == 0 && !self.config.dry_run {
            tracing::debug!(model = %schema.name, "Save matched no row, inserting");
            let upsert = OnConflict {
                columns: schema.primary_fields().map(|f| Column::new(&f.column)).collect(),
                do_updates: schema
                    .fields
                    .iter()
                    .filter(writable)
                    .map(|f| Column::new(&f.column))
                    .collect(),
                ..OnConflict::default()
            };
            return self.clauses([Clause::from(upsert)]).create(cx, value);
        }
        db.write_back(value)?;
        db.executed()
    }

    fn update_with<M: Model>(&self, record: Record, assignments: Vec<(String, Operand)>) -> Db {
        self.model::<M>().edit(|s| {
            s.dest = Dest::One(record);
            s.update_values = assignments;
        })
    }

    #[tracing::instrument(level = "debug", skip_all, fields(model = std::any::type_name::<M>()))]
    fn run_update<M: Model>(
        &self,
        cx: &Cx,
        value: &mut M,
        record: Record,
        assignments: Vec<(String, Operand)>,
    ) -> Result<Executed> {
        let mut db = self.update_with::<M>(record, assignments);
        db.run(cx, Operation::Update);
        db.write_back(value)?;
        db.executed()
    }

    /// Update the named fields. With no names, every non-zero field that is
    /// neither a primary key nor read-only. Update-time fields are set to
    /// the current time unless named.
    pub fn update<M: Model>(&self, cx: &Cx, value: &mut M, fields: &[&str]) -> Result<Executed> {
        let schema = self.schema_of::<M>()?;
        let record = value.to_record();
        let assignments = if fields.is_empty() {
            schema
                .fields
                .iter()
                .filter(writable)
                .filter(|f| !f.auto_update_time && !record.is_zero(&f.name))
                .map(|f| (f.name.clone(), Operand::Value(record.value(&f.name).clone())))
                .collect()
        } else {
            fields
                .iter()
                .map(|name| -> Result<(String, Operand)> {
                    let field = lookup_field(&schema, name)?;
                    Ok((field.name.clone(), Operand::Value(record.value(&field.name).clone())))
                })
                .collect::<Result<_>>()?
        };
        self.run_update(cx, value, record, assignments)
    }

    /// Set the given fields on `value` and update exactly those.
    pub fn updates<M: Model>(
        &self,
        cx: &Cx,
        value: &mut M,
        pairs: Vec<(&str, Value)>,
    ) -> Result<Executed> {
        let schema = self.schema_of::<M>()?;
        let mut record = value.to_record();
        let mut assignments = Vec::with_capacity(pairs.len());
        for (name, v) in pairs {
            let field = lookup_field(&schema, name)?;
            record.set(field.name.clone(), v.clone());
            assignments.push((field.name.clone(), Operand::Value(v)));
        }
        self.run_update(cx, value, record, assignments)
    }

    /// Update one column without calling hooks or touching update times.
    pub fn update_column<M: Model>(
        &self,
        cx: &Cx,
        value: &mut M,
        field: &str,
        v: impl Into<Value>,
    ) -> Result<Executed> {
        let mut db = self.get_instance().edit(|s| s.updating_column = true);
        db.config.skip_hooks = true;
        db.updates(cx, value, vec![(field, v.into())])
    }

    /// Delete `value` by primary key, narrowed by `conditions`.
    #[tracing::instrument(level = "debug", skip_all, fields(model = std::any::type_name::<M>()))]
    pub fn delete<M: Model>(
        &self,
        cx: &Cx,
        value: &M,
        conditions: Vec<Condition>,
    ) -> Result<Executed> {
        let record = value.to_record();
        let mut db = self.model::<M>().edit(|s| {
            s.add_conditions(conditions);
            s.dest = Dest::One(record);
        });
        db.run(cx, Operation::Delete);
        db.executed()
    }

    /// Execute raw SQL with `?` placeholders.
    #[tracing::instrument(level = "debug", skip(self, cx, args))]
    pub fn exec(&self, cx: &Cx, sql: &str, args: Vec<Value>) -> Result<Executed> {
        let mut db = self.raw(sql, args);
        db.run(cx, Operation::Raw);
        db.executed()
    }

    /// Run the statement and return its rows undecoded.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn rows(&self, cx: &Cx) -> Result<Vec<Row>> {
        let mut db = self.get_instance();
        db.run(cx, Operation::Row);
        if let Some(e) = db.error() {
            return Err(e.clone());
        }
        match std::mem::take(&mut std::sync::Arc::make_mut(&mut db.statement).dest) {
            Dest::Rows(rows) => Ok(rows),
            _ => Ok(Vec::new()),
        }
    }

    /// Run the statement and decode its rows into `out`. Without a model the
    /// rows are mapped through `M`'s schema.
    #[tracing::instrument(level = "debug", skip_all, fields(model = std::any::type_name::<M>()))]
    pub fn scan<M: Model>(&self, cx: &Cx, out: &mut Vec<M>) -> Result<Executed> {
        let mut db = self.get_instance().edit(|s| {
            if s.model.is_none() {
                s.model = Some(SchemaRef::of::<M>());
            }
            s.dest = Dest::Many(Vec::new());
        });
        db.run(cx, Operation::Query);
        *out = db
            .statement()
            .dest
            .records()
            .iter()
            .map(M::from_record)
            .collect::<Result<_>>()?;
        db.executed()
    }

    /// `COUNT(*)` over the statement's conditions. Ordering is dropped.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn count(&self, cx: &Cx) -> Result<i64> {
        let mut db = self.get_instance().edit(|s| {
            s.clauses.remove(ClauseKind::OrderBy);
            s.selects.clear();
            s.distinct = false;
            s.add_clause(Select {
                expression: Some(Expr::raw("COUNT(*)", Vec::new())),
                ..Select::default()
            });
        });
        db.run(cx, Operation::Row);
        if let Some(e) = db.error() {
            return Err(e.clone());
        }
        let count = match &db.statement().dest {
            Dest::Rows(rows) => rows.first().and_then(|r| r.get(0)).and_then(Value::as_i64),
            _ => None,
        };
        Ok(count.unwrap_or(0))
    }
}

fn lookup_field<'s>(schema: &'s Schema, name: &str) -> Result<&'s Field> {
    schema.lookup(name).ok_or_else(|| {
        schema_error(
            SchemaErrorKind::MissingField,
            &schema.name,
            format!("{name}: no such field"),
        )
    })
}
