use strata_error::{StrataResult, strata_bail, strata_err};
use strata_scalar::{ColumnSpec, Value};

/// Persistence of one wide table.
///
/// Rows are only ever appended and columns only ever added or extended, so a row index stays
/// valid for the lifetime of the table. Every row carries a `row_id` assigned at insertion.
pub trait TableStore {
    fn row_count(&self) -> usize;

    /// Column names in creation order.
    fn column_names(&self) -> Vec<String>;

    fn column_spec(&self, name: &str) -> Option<&ColumnSpec>;

    /// All values of a column, one per row.
    fn read_column(&self, name: &str) -> StrataResult<Vec<Value>>;

    /// The `row_id` of every row, in row order.
    fn row_ids(&self) -> &[usize];

    /// Append rows given as one value vector per column, returning the fresh row ids.
    ///
    /// Every existing column must receive exactly one vector and all vectors must have the same
    /// length.
    fn append_rows(&mut self, values_by_column: Vec<(String, Vec<Value>)>)
    -> StrataResult<Vec<usize>>;

    /// Create a column, or replace the contents of an existing one.
    ///
    /// `values` holds at most one value per row, rows past its end receive `null_fill`, which
    /// must then be given.
    fn add_or_extend_column(
        &mut self,
        spec: ColumnSpec,
        values: Vec<Value>,
        null_fill: Option<Value>,
    ) -> StrataResult<()>;

    fn has_column(&self, name: &str) -> bool {
        self.column_spec(name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct MemColumn {
    spec: ColumnSpec,
    values: Vec<Value>,
}

/// An in-memory [`TableStore`].
///
/// Values written to a key column can never change afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemTable {
    key_columns: Vec<String>,
    row_ids: Vec<usize>,
    next_row_id: usize,
    columns: Vec<MemColumn>,
}

impl MemTable {
    pub fn new<I, S>(key_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_columns: key_columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Borrow the values of a column.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.find(name).map(|c| c.values.as_slice())
    }

    /// The value of one cell.
    pub fn cell(&self, name: &str, row: usize) -> Option<&Value> {
        self.column(name).and_then(|values| values.get(row))
    }

    fn find(&self, name: &str) -> Option<&MemColumn> {
        self.columns.iter().find(|c| c.spec.name() == name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.spec.name() == name)
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> StrataResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> StrataResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TableStore for MemTable {
    fn row_count(&self) -> usize {
        self.row_ids.len()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.spec.name().to_string())
            .collect()
    }

    fn column_spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.find(name).map(|c| &c.spec)
    }

    fn read_column(&self, name: &str) -> StrataResult<Vec<Value>> {
        self.column(name)
            .map(<[Value]>::to_vec)
            .ok_or_else(|| strata_err!(Schema: "table has no column {}", name))
    }

    fn row_ids(&self) -> &[usize] {
        &self.row_ids
    }

    fn append_rows(
        &mut self,
        mut values_by_column: Vec<(String, Vec<Value>)>,
    ) -> StrataResult<Vec<usize>> {
        let Some(num_rows) = values_by_column.first().map(|(_, values)| values.len()) else {
            strata_bail!("cannot append rows without any column");
        };

        for (name, values) in &values_by_column {
            let Some(column) = self.find(name) else {
                strata_bail!(Schema: "cannot append to unknown column {}", name);
            };
            if values.len() != num_rows {
                strata_bail!(
                    "column {} has {} values, expected {}",
                    name,
                    values.len(),
                    num_rows
                );
            }
            values
                .iter()
                .try_for_each(|value| column.spec.check_value(value))?;
        }
        for column in &self.columns {
            let provided = values_by_column
                .iter()
                .filter(|(name, _)| name == column.spec.name())
                .count();
            if provided != 1 {
                strata_bail!(
                    "column {} must be given exactly once when appending, got {}",
                    column.spec.name(),
                    provided
                );
            }
        }

        for (name, values) in values_by_column.drain(..) {
            if let Some(idx) = self.position(&name) {
                self.columns[idx].values.extend(values);
            }
        }
        let row_ids: Vec<usize> = (self.next_row_id..self.next_row_id + num_rows).collect();
        self.next_row_id += num_rows;
        self.row_ids.extend_from_slice(&row_ids);
        Ok(row_ids)
    }

    fn add_or_extend_column(
        &mut self,
        spec: ColumnSpec,
        mut values: Vec<Value>,
        null_fill: Option<Value>,
    ) -> StrataResult<()> {
        let row_count = self.row_count();
        if values.len() > row_count {
            strata_bail!(
                "column {} has {} values but the table only has {} rows",
                spec.name(),
                values.len(),
                row_count
            );
        }
        values.iter().try_for_each(|value| spec.check_value(value))?;
        if values.len() < row_count {
            let Some(null_fill) = null_fill else {
                strata_bail!(
                    NullInference: "column {} needs a null fill for {} rows",
                    spec.name(),
                    row_count - values.len()
                );
            };
            spec.check_value(&null_fill)?;
            values.resize(row_count, null_fill);
        }

        let Some(idx) = self.position(spec.name()) else {
            self.columns.push(MemColumn { spec, values });
            return Ok(());
        };

        let column = &mut self.columns[idx];
        if !column.spec.is_compatible_with(&spec) {
            strata_bail!(
                Schema: "column {} cannot change type from {} to {}",
                spec.name(),
                column.spec.dtype(),
                spec.dtype()
            );
        }
        if self.key_columns.iter().any(|k| k == spec.name()) && column.values != values {
            strata_bail!(
                IdentityConflict: "key column {} cannot be rewritten",
                spec.name()
            );
        }
        column.values = values;
        Ok(())
    }
}
