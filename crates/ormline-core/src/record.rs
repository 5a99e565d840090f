//! Dynamic entity values.
//!
//! A [`Record`] is what the statement pipeline actually works on: field
//! values keyed by field name plus any related records loaded through joins
//! or preloads. Typed models convert to and from records once at the edges
//! of each operation.

use crate::Result;
use crate::error::Error;
use crate::value::{FromValue, Value, ValueKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Related data held by a record under a relationship name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Related {
    /// belongs-to / has-one
    One(Option<Box<Record>>),
    /// has-many / many-to-many
    Many(Vec<Record>),
}

impl Related {
    /// Iterate the records held, whatever the cardinality.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        let slice: &[Record] = match self {
            Related::One(Some(record)) => std::slice::from_ref(&**record),
            Related::One(None) => &[],
            Related::Many(records) => records,
        };
        slice.iter()
    }

    /// Mutable counterpart of [`Related::records`].
    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        let slice: &mut [Record] = match self {
            Related::One(Some(record)) => std::slice::from_mut(&mut **record),
            Related::One(None) => &mut [],
            Related::Many(records) => records,
        };
        slice.iter_mut()
    }
}

/// A dynamically-typed entity value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: BTreeMap<String, Value>,
    relations: BTreeMap<String, Related>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Record::set`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Builder form of [`Record::set_relation`] for a single related value.
    pub fn with_one(mut self, name: impl Into<String>, record: Option<Record>) -> Self {
        self.set_relation(name, Related::One(record.map(Box::new)));
        self
    }

    /// Builder form of [`Record::set_relation`] for a collection.
    pub fn with_many(mut self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.set_relation(name, Related::Many(records));
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// The value of `field`, or NULL if the record does not carry it.
    pub fn value(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&Value::Null)
    }

    /// Decode a field into a Rust type. Missing fields decode as NULL.
    pub fn get_as<T: FromValue>(&self, field: &str) -> Result<T> {
        T::from_value(self.value(field)).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(field.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    pub fn is_zero(&self, field: &str) -> bool {
        self.value(field).is_zero()
    }

    /// Iterate (field, value) pairs in field-name order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy every field value of `other` into this record, leaving relations alone.
    pub fn assign_values(&mut self, other: &Record) {
        for (field, value) in &other.values {
            self.values.insert(field.clone(), value.clone());
        }
    }

    /// Hashable key built from `fields`. `None` when any part is NULL or zero.
    pub fn key(&self, fields: &[String]) -> Option<Vec<ValueKey>> {
        fields
            .iter()
            .map(|f| {
                let value = self.value(f);
                if value.is_zero() { None } else { value.to_key() }
            })
            .collect()
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.relations.get_mut(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    /// Names of the relations this record carries.
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    /// The single related record under `name`, if loaded.
    pub fn one(&self, name: &str) -> Option<&Record> {
        match self.relations.get(name) {
            Some(Related::One(Some(record))) => Some(&**record),
            _ => None,
        }
    }

    /// The related collection under `name`; empty when not loaded.
    pub fn many(&self, name: &str) -> &[Record] {
        match self.relations.get(name) {
            Some(Related::Many(records)) => records,
            _ => &[],
        }
    }
}
