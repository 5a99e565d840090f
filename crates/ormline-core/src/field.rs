//! Field and column definitions.

/// Static description of one model field.
///
/// Field names are the names records use; the column name is derived from
/// the field name by the engine's naming strategy unless set explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name as records carry it
    pub name: &'static str,
    /// Explicit database column name
    pub column: Option<&'static str>,
    /// Whether this is a primary key
    pub primary_key: bool,
    /// Whether the database assigns this field on insert
    pub auto_increment: bool,
    /// Whether the column has a database default; zero values are then left
    /// out of INSERT statements
    pub has_default: bool,
    /// Read-only fields are scanned but never written
    pub read_only: bool,
    /// Set to the current time when a record is created with it zero
    pub auto_create_time: bool,
    /// Set to the current time on create and on every update
    pub auto_update_time: bool,
}

impl FieldInfo {
    /// Create a new field info with minimal required data.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column: None,
            primary_key: false,
            auto_increment: false,
            has_default: false,
            read_only: false,
            auto_create_time: false,
            auto_update_time: false,
        }
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column = Some(name);
        self
    }

    /// Set whether this is a primary key.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set whether this field auto-increments. Implies a database default.
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self.has_default = value || self.has_default;
        self
    }

    /// Mark the column as having a database default.
    pub const fn has_default(mut self, value: bool) -> Self {
        self.has_default = value;
        self
    }

    /// Exclude this field from INSERT and UPDATE statements.
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Track the creation time in this field.
    pub const fn auto_create_time(mut self, value: bool) -> Self {
        self.auto_create_time = value;
        self
    }

    /// Track the last update time in this field.
    pub const fn auto_update_time(mut self, value: bool) -> Self {
        self.auto_update_time = value;
        self
    }
}
