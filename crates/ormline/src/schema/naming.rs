//! Table and column naming.

use std::fmt;

/// Derives database names from model and field names.
pub trait NamingStrategy: fmt::Debug + Send + Sync {
    /// Table name for a model.
    fn table_name(&self, model: &str) -> String;

    /// Column name for a field.
    fn column_name(&self, table: &str, field: &str) -> String;

    /// Column name used in join tables to refer to `model`'s `field`.
    fn join_table_column(&self, model: &str, column: &str) -> String {
        format!("{}_{}", to_snake_case(model), column)
    }
}

/// snake_case columns and pluralized snake_case tables.
#[derive(Debug, Clone, Default)]
pub struct SnakeCaseNaming {
    pub table_prefix: String,
    pub singular_table: bool,
}

impl NamingStrategy for SnakeCaseNaming {
    fn table_name(&self, model: &str) -> String {
        let name = to_snake_case(model);
        if self.singular_table {
            format!("{}{}", self.table_prefix, name)
        } else {
            format!("{}{}", self.table_prefix, pluralize(&name))
        }
    }

    fn column_name(&self, _table: &str, field: &str) -> String {
        to_snake_case(field)
    }
}

/// `CompanyID` becomes `company_id`, `HTTPServer` becomes `http_server`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// English plural for table names.
pub fn pluralize(word: &str) -> String {
    let vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u');
    if let Some(stem) = word.strip_suffix('y') {
        if stem.chars().last().is_some_and(|c| !vowel(c)) {
            return format!("{stem}ies");
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Inverse of [`pluralize`] for the common cases.
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ches", "shes", "sses", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.ends_with('s') => stem.to_string(),
        _ => word.to_string(),
    }
}
