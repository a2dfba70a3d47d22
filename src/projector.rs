//! Projection of decoded catalog entries into the flat JSON record shape.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::{Table, Tag};

/// One emitted JSON object; field order is the serialized order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub writable: bool,
    pub path: String,
    pub group: String,
    pub description: BTreeMap<String, String>,
}

/// Flatten one tag of `table`. A repeated `lang` keeps the later value.
pub fn project_tag(table: &Table, tag: &Tag) -> OutputRecord {
    let description = tag
        .descriptions
        .iter()
        .map(|desc| (desc.lang.clone(), desc.value.clone()))
        .collect();

    OutputRecord {
        kind: tag.kind.clone(),
        writable: tag.writable,
        path: format!("{}:{}", table.name, tag.name),
        group: table.name.clone(),
        description,
    }
}

/// All records of a table, in tag order
pub fn project_table(table: &Table) -> impl Iterator<Item = OutputRecord> + '_ {
    table.tags.iter().map(move |tag| project_tag(table, tag))
}
