//! Process-wide memo of parsed schemas.

use super::{NamingStrategy, Schema, SchemaRef};
use ormline_core::Result;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe cache of parsed schemas keyed by model type.
///
/// Schemas are parsed lazily on first use. Two threads racing on the same
/// type may both parse it; the last insert wins and every caller gets an
/// equivalent schema. Cached schemas are never mutated; [`replace`] swaps in
/// a new one for later operations.
///
/// [`replace`]: SchemaCache::replace
#[derive(Debug, Default)]
pub struct SchemaCache {
    schemas: RwLock<HashMap<TypeId, Arc<Schema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, model: &SchemaRef, naming: &dyn NamingStrategy) -> Result<Arc<Schema>> {
        {
            let schemas = self.schemas.read().unwrap_or_else(|e| e.into_inner());
            if let Some(schema) = schemas.get(&model.type_id()) {
                return Ok(Arc::clone(schema));
            }
        }

        let schema = Arc::new(Schema::parse(model, naming)?);
        tracing::debug!(
            model = model.type_name(),
            table = %schema.table,
            relationships = schema.relationships.len(),
            "Parsed schema"
        );
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        schemas.insert(model.type_id(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Install `schema` for its model. Statements already holding the old
    /// schema keep it.
    pub fn replace(&self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        schemas.insert(schema.model.type_id(), Arc::clone(&schema));
        schema
    }

    pub fn len(&self) -> usize {
        self.schemas.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Model, ModelDef, SnakeCaseNaming};
    use ormline_core::{FieldInfo, Record};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DESCRIBED: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl Model for Counted {
        fn describe() -> ModelDef {
            DESCRIBED.fetch_add(1, Ordering::SeqCst);
            ModelDef::new("Counted").field(FieldInfo::new("ID"))
        }

        fn to_record(&self) -> Record {
            Record::new()
        }

        fn from_record(_record: &Record) -> Result<Self> {
            Ok(Counted)
        }
    }

    struct Racy;

    impl Model for Racy {
        fn describe() -> ModelDef {
            ModelDef::new("Racy").field(FieldInfo::new("ID"))
        }

        fn to_record(&self) -> Record {
            Record::new()
        }

        fn from_record(_record: &Record) -> Result<Self> {
            Ok(Racy)
        }
    }

    #[test]
    fn parses_each_type_once() {
        let cache = SchemaCache::new();
        let naming = SnakeCaseNaming::default();
        let first = cache.parse(&SchemaRef::of::<Counted>(), &naming).unwrap();
        let second = cache.parse(&SchemaRef::of::<Counted>(), &naming).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(DESCRIBED.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_parses_agree() {
        let cache = Arc::new(SchemaCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache
                        .parse(&SchemaRef::of::<Racy>(), &SnakeCaseNaming::default())
                        .unwrap()
                        .table
                        .clone()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "racies");
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn replaced_schema_is_served_afterwards() {
        let cache = SchemaCache::new();
        let naming = SnakeCaseNaming::default();
        let first = cache.parse(&SchemaRef::of::<Racy>(), &naming).unwrap();
        let mut changed = (*first).clone();
        changed.table = "racy_things".into();
        cache.replace(changed);

        let again = cache.parse(&SchemaRef::of::<Racy>(), &naming).unwrap();
        assert_eq!(again.table, "racy_things");
        assert_eq!(first.table, "racies");
        assert_eq!(cache.len(), 1);
    }
}
