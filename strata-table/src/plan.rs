//! Partitioning of columns for one merge.
//!
//! Row-append columns are written positionally for rows appended by the merge: the required
//! schema columns and every column the table already has. Post-hoc columns are the incoming
//! columns outside the schema; they are created or extended over the whole table after the
//! append, so rows that predate them are back-filled with the column's null.

use itertools::Itertools;
use strata_error::{StrataResult, strata_bail};
use strata_scalar::{ColumnSpec, ScalarValue, Value};

/// A column as the merge will write it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedColumn {
    spec: ColumnSpec,
    null: Option<Value>,
    exists: bool,
    incoming: Option<usize>,
}

impl PlannedColumn {
    fn new(
        spec: ColumnSpec,
        fallback: Option<ColumnSpec>,
        exists: bool,
        incoming: Option<usize>,
    ) -> Self {
        let null = spec
            .resolve_null()
            .ok()
            .or_else(|| fallback.as_ref().and_then(|f| f.resolve_null().ok()))
            .filter(|null| spec.check_value(null).is_ok());
        Self {
            spec,
            null,
            exists,
            incoming,
        }
    }

    /// The spec of the column as stored in the table.
    pub fn spec(&self) -> &ColumnSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Whether the table already has this column.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Position of the batch column providing values, if any.
    pub fn incoming(&self) -> Option<usize> {
        self.incoming
    }

    /// The back-fill value of the column.
    pub fn null(&self) -> StrataResult<&Value> {
        match &self.null {
            Some(null) => Ok(null),
            None => {
                self.spec.resolve_null()?;
                strata_bail!(
                    NullInference: "null value of column {} does not match its type {}",
                    self.spec.name(),
                    self.spec.dtype()
                )
            }
        }
    }

    /// Whether a cell holds no real value.
    ///
    /// Any NaN counts, whatever its sign or payload.
    pub fn is_null(&self, value: &Value) -> bool {
        let missing = value.as_scalar().is_some_and(|scalar| match scalar {
            ScalarValue::Null => true,
            ScalarValue::Primitive(p) => p.is_nan(),
            _ => false,
        });
        missing || self.null.as_ref() == Some(value)
    }
}

/// How each column takes part in one merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    row_append: Vec<PlannedColumn>,
    post_hoc: Vec<PlannedColumn>,
}

impl MergePlan {
    pub fn row_append(&self) -> &[PlannedColumn] {
        &self.row_append
    }

    pub fn post_hoc(&self) -> &[PlannedColumn] {
        &self.post_hoc
    }
}

fn find<'a>(specs: &'a [ColumnSpec], name: &str) -> Option<&'a ColumnSpec> {
    specs.iter().find(|s| s.name() == name)
}

/// Plan a merge of `incoming` columns into a table with `existing` columns.
///
/// `required` are the schema columns every row must have, including the key columns. An incoming
/// column that reuses a schema or existing column name with a different type is a schema error.
pub fn plan(
    existing: &[ColumnSpec],
    incoming: &[ColumnSpec],
    required: &[ColumnSpec],
) -> StrataResult<MergePlan> {
    if let Some(dup) = incoming.iter().map(ColumnSpec::name).duplicates().next() {
        strata_bail!(Schema: "column {} appears twice in one batch", dup);
    }
    for spec in incoming {
        if let Some(schema) = find(required, spec.name()) {
            if !schema.is_compatible_with(spec) {
                strata_bail!(
                    Schema: "column {} is reserved with type {}, got {}",
                    spec.name(),
                    schema.dtype(),
                    spec.dtype()
                );
            }
        }
        if let Some(current) = find(existing, spec.name()) {
            if !current.is_compatible_with(spec) {
                strata_bail!(
                    Schema: "column {} has type {} in the table, got {}",
                    spec.name(),
                    current.dtype(),
                    spec.dtype()
                );
            }
        }
    }
    for schema in required {
        if let Some(current) = find(existing, schema.name()) {
            if !current.is_compatible_with(schema) {
                strata_bail!(
                    Schema: "table column {} of type {} clashes with reserved type {}",
                    schema.name(),
                    current.dtype(),
                    schema.dtype()
                );
            }
        }
    }

    let incoming_position = |name: &str| incoming.iter().position(|s| s.name() == name);

    let mut row_append: Vec<PlannedColumn> = required
        .iter()
        .map(|schema| match find(existing, schema.name()) {
            Some(current) => PlannedColumn::new(
                current.clone(),
                Some(schema.clone()),
                true,
                incoming_position(schema.name()),
            ),
            None => PlannedColumn::new(schema.clone(), None, false, incoming_position(schema.name())),
        })
        .collect();
    row_append.extend(
        existing
            .iter()
            .filter(|spec| find(required, spec.name()).is_none())
            .map(|spec| {
                let fallback = incoming_position(spec.name()).map(|i| incoming[i].clone());
                PlannedColumn::new(spec.clone(), fallback, true, incoming_position(spec.name()))
            }),
    );

    let post_hoc: Vec<PlannedColumn> = incoming
        .iter()
        .enumerate()
        .filter(|(_, spec)| find(required, spec.name()).is_none())
        .map(|(i, spec)| match find(existing, spec.name()) {
            Some(current) => PlannedColumn::new(current.clone(), Some(spec.clone()), true, Some(i)),
            None => PlannedColumn::new(spec.clone(), None, false, Some(i)),
        })
        .collect();

    log::debug!(
        "merge plan: row-append [{}], post-hoc [{}]",
        row_append.iter().map(PlannedColumn::name).format(", "),
        post_hoc.iter().map(PlannedColumn::name).format(", ")
    );
    Ok(MergePlan {
        row_append,
        post_hoc,
    })
}
