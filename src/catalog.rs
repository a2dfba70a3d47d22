//! Tag catalog data model
//!
//! These values live only while one `<table>` element is being scanned and
//! projected; nothing here outlives the request that produced it.

/// A named group of tag definitions, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub tags: Vec<Tag>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
        }
    }
}

/// A single metadata field definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub kind: String,
    pub writable: bool,
    pub descriptions: Vec<Description>,
}

/// A localized label attached to a tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    pub lang: String,
    pub value: String,
}

impl Description {
    pub fn new(lang: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            value: value.into(),
        }
    }
}

/// Parse a boolean attribute the way the catalog tool spells them.
///
/// Unrecognised spellings are `false`.
pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim(), "1" | "t" | "T" | "true" | "TRUE" | "True")
}
