//! Composite row identity.
//!
//! Rows are matched across merges by their virtual id, the key fields of a row joined with
//! [`KEY_SEPARATOR`]. Two rows with the same virtual id are the same element or entity no matter
//! which source produced them.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strata_error::{StrataResult, strata_bail, strata_err};
use strata_scalar::Value;

use crate::store::TableStore;

/// Reserved separator between the key fields of a virtual id.
pub const KEY_SEPARATOR: char = '\u{0}';

/// The composite key that identifies one table row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualId(String);

impl VirtualId {
    /// Join key fields into a virtual id, rejecting fields that contain the separator.
    pub fn try_from_fields<S: AsRef<str>>(fields: &[S]) -> StrataResult<Self> {
        if fields.is_empty() {
            strata_bail!("a virtual id needs at least one key field");
        }
        if let Some(field) = fields.iter().find(|f| f.as_ref().contains(KEY_SEPARATOR)) {
            strata_bail!(
                "key field {:?} contains the reserved separator",
                field.as_ref()
            );
        }
        Ok(Self(
            fields
                .iter()
                .map(AsRef::as_ref)
                .join(&KEY_SEPARATOR.to_string()),
        ))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.split(KEY_SEPARATOR)
    }
}

impl Display for VirtualId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.fields().format(", "))
    }
}

/// The ordered key columns of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    columns: Vec<String>,
}

impl KeySchema {
    pub fn try_new<I, S>(columns: I) -> StrataResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            strata_bail!("a key schema needs at least one column");
        }
        if !columns.iter().all_unique() {
            strata_bail!("key columns {:?} are not unique", columns);
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Build the virtual id of every row from one value vector per key column.
    pub fn virtual_ids(&self, key_values: &[&[Value]]) -> StrataResult<Vec<VirtualId>> {
        let num_rows = key_values.first().map_or(0, |values| values.len());
        (0..num_rows)
            .map(|row| {
                let fields = self
                    .columns
                    .iter()
                    .zip(key_values)
                    .map(|(name, values)| key_field(name, values, row))
                    .collect::<StrataResult<Vec<_>>>()?;
                VirtualId::try_from_fields(&fields)
            })
            .collect()
    }
}

fn key_field<'a>(name: &str, values: &'a [Value], row: usize) -> StrataResult<&'a str> {
    values
        .get(row)
        .ok_or_else(|| strata_err!(OutOfBounds: row, 0, values.len()))?
        .as_str()
        .ok_or_else(|| strata_err!(Schema: "key column {} holds a non-string value at row {}", name, row))
}

/// Lookup from virtual id to row index of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableIndex {
    rows: HashMap<VirtualId, usize>,
}

impl TableIndex {
    pub fn get(&self, id: &VirtualId) -> Option<usize> {
        self.rows.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Index the existing rows of a table by virtual id.
///
/// An empty table yields an empty index even if the key columns do not exist yet.
pub fn build_table_index<S: TableStore + ?Sized>(
    table: &S,
    keys: &KeySchema,
) -> StrataResult<TableIndex> {
    if table.row_count() == 0 {
        return Ok(TableIndex::default());
    }

    let columns = keys
        .columns()
        .iter()
        .map(|name| table.read_column(name))
        .collect::<StrataResult<Vec<_>>>()?;
    let slices: Vec<&[Value]> = columns.iter().map(Vec::as_slice).collect();

    let mut rows = HashMap::with_capacity(table.row_count());
    for (row, id) in keys.virtual_ids(&slices)?.into_iter().enumerate() {
        match rows.entry(id) {
            Entry::Occupied(e) => strata_bail!(
                IdentityConflict: "rows {} and {} of the table share virtual id {}",
                e.get(),
                row,
                e.key()
            ),
            Entry::Vacant(e) => {
                e.insert(row);
            }
        }
    }
    Ok(TableIndex { rows })
}

/// Map every source row to the table row with the same virtual id, or `None` if it is new.
///
/// Two source rows with the same virtual id are an identity conflict.
pub fn resolve(source_keys: &[VirtualId], index: &TableIndex) -> StrataResult<Vec<Option<usize>>> {
    let mut seen: HashMap<&VirtualId, usize> = HashMap::with_capacity(source_keys.len());
    source_keys
        .iter()
        .enumerate()
        .map(|(row, id)| {
            if let Some(first) = seen.insert(id, row) {
                strata_bail!(
                    IdentityConflict: "source rows {} and {} share virtual id {}",
                    first,
                    row,
                    id
                );
            }
            Ok(index.get(id))
        })
        .collect()
}
