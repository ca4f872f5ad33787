use itertools::Itertools;
use strata_error::{ContextExt, StrataResult, strata_bail, strata_err};
use strata_scalar::{ColumnSpec, Value};

use crate::batch::Batch;
use crate::config::DefaultsConfig;
use crate::identity::{KeySchema, TableIndex, build_table_index, resolve};
use crate::plan::{MergePlan, PlannedColumn, plan};
use crate::store::TableStore;

/// What one call to [`TableEngine::merge`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub rows_appended: usize,
    pub rows_matched: usize,
    pub columns_created: Vec<String>,
    pub columns_extended: Vec<String>,
    /// Incoming values that disagreed with a value already in the table and were dropped.
    pub values_ignored: usize,
    /// Table row index of every source row.
    pub row_mapping: Vec<usize>,
    /// `row_id` of every source row.
    pub row_ids: Vec<usize>,
}

impl MergeReport {
    /// Whether the merge left the table as it was.
    pub fn is_noop(&self) -> bool {
        self.rows_appended == 0
            && self.columns_created.is_empty()
            && self.columns_extended.is_empty()
    }
}

/// Reconciles batches from independent sources into one append-only table.
///
/// Each merge resolves the batch rows against the table by virtual id, appends the rows it has
/// not seen before, then creates or extends the batch's extra columns over the whole table.
/// Merging the same batch twice leaves the table unchanged.
#[derive(Debug)]
pub struct TableEngine<S> {
    store: S,
    keys: KeySchema,
    required: Vec<ColumnSpec>,
    defaults: DefaultsConfig,
}

impl<S: TableStore> TableEngine<S> {
    /// `required` lists the schema columns every row has; it must contain the key columns as
    /// non-ragged strings.
    pub fn try_new(
        store: S,
        keys: KeySchema,
        required: Vec<ColumnSpec>,
        defaults: DefaultsConfig,
    ) -> StrataResult<Self> {
        for key in keys.columns() {
            match required.iter().find(|spec| spec.name() == key) {
                Some(spec) if spec.dtype().is_utf8() => {}
                Some(spec) => strata_bail!(
                    Schema: "key column {} must be a string column, not {}",
                    key,
                    spec.dtype()
                ),
                None => strata_bail!(Schema: "key column {} is not a required column", key),
            }
        }
        // Fail early on a store whose rows already violate the identity invariant.
        build_table_index(&store, &keys)?;
        Ok(Self {
            store,
            keys,
            required,
            defaults,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn keys(&self) -> &KeySchema {
        &self.keys
    }

    pub fn required(&self) -> &[ColumnSpec] {
        &self.required
    }

    pub fn defaults(&self) -> &DefaultsConfig {
        &self.defaults
    }

    pub fn index(&self) -> StrataResult<TableIndex> {
        build_table_index(&self.store, &self.keys)
    }

    fn existing_specs(&self) -> Vec<ColumnSpec> {
        self.store
            .column_names()
            .iter()
            .filter_map(|name| self.store.column_spec(name).cloned())
            .collect()
    }

    /// Merge one source batch into the table.
    ///
    /// Every error short of a store failure is raised before the table is touched. Rows appended
    /// before a failing column extension stay valid, so merging the corrected batch again does
    /// not duplicate them.
    pub fn merge(&mut self, batch: &Batch) -> StrataResult<MergeReport> {
        // Validate the batch and plan the columns.
        let plan = plan(&self.existing_specs(), &batch.specs(), &self.required)?;
        let key_values = self
            .keys
            .columns()
            .iter()
            .map(|key| {
                batch
                    .column(key)
                    .map(|column| column.values.as_slice())
                    .ok_or_else(|| strata_err!(Schema: "batch is missing key column {}", key))
            })
            .collect::<StrataResult<Vec<_>>>()?;
        let ids = self.keys.virtual_ids(&key_values)?;

        // Resolve identity against the current rows.
        let resolved = resolve(&ids, &build_table_index(&self.store, &self.keys)?)?;
        let new_rows = resolved
            .iter()
            .positions(Option::is_none)
            .collect::<Vec<_>>();
        let rows_before = self.store.row_count();
        let rows_matched = batch.num_rows() - new_rows.len();
        self.check_nulls(&plan, rows_before, rows_matched, !new_rows.is_empty())?;

        let mut report = MergeReport {
            rows_matched,
            ..Default::default()
        };

        // Append the rows we have not seen before.
        for column in plan.row_append().iter().filter(|c| !c.exists()) {
            let null = column.null().ok().cloned();
            self.store
                .add_or_extend_column(column.spec().clone(), vec![], null)?;
            report.columns_created.push(column.name().to_string());
        }
        if !new_rows.is_empty() {
            self.append(&plan, batch, &new_rows)?;
            report.rows_appended = new_rows.len();
        }

        // Re-index, so matched and appended rows map to where they live now.
        let index = build_table_index(&self.store, &self.keys)?;
        let row_mapping = ids
            .iter()
            .map(|id| {
                index
                    .get(id)
                    .ok_or_else(|| strata_err!(AssertionFailed: "row {} vanished from the table", id))
            })
            .collect::<StrataResult<Vec<_>>>()?;
        let row_ids = self.store.row_ids();
        report.row_ids = row_mapping.iter().map(|&row| row_ids[row]).collect();

        // Create or extend the extra columns across the full table.
        for column in plan.post_hoc() {
            self.extend(column, batch, &row_mapping, &mut report)?;
        }
        report.row_mapping = row_mapping;

        log::debug!(
            "merged {} rows: {} appended, {} matched, created [{}], extended [{}]",
            batch.num_rows(),
            report.rows_appended,
            report.rows_matched,
            report.columns_created.iter().format(", "),
            report.columns_extended.iter().format(", ")
        );
        Ok(report)
    }

    /// Make sure every null the merge will need can be inferred.
    fn check_nulls(
        &self,
        plan: &MergePlan,
        rows_before: usize,
        rows_matched: usize,
        appending: bool,
    ) -> StrataResult<()> {
        for column in plan.row_append() {
            let backfill = !column.exists() && rows_before > 0;
            let positional = appending && column.incoming().is_none();
            if backfill || positional {
                column.null()?;
            }
        }
        // A new column covers the batch rows, every other row needs a null.
        for column in plan.post_hoc().iter().filter(|c| !c.exists()) {
            if rows_before > rows_matched {
                column.null()?;
            }
        }
        Ok(())
    }

    fn append(&mut self, plan: &MergePlan, batch: &Batch, new_rows: &[usize]) -> StrataResult<()> {
        let values_by_column = plan
            .row_append()
            .iter()
            .map(|column| -> StrataResult<(String, Vec<Value>)> {
                let values = match column.incoming() {
                    Some(i) => {
                        let source = &batch.columns()[i].values;
                        new_rows.iter().map(|&row| source[row].clone()).collect()
                    }
                    None => vec![column.null()?.clone(); new_rows.len()],
                };
                Ok((column.name().to_string(), values))
            })
            .collect::<StrataResult<Vec<_>>>()?;
        self.store
            .append_rows(values_by_column)
            .with_context(|| format!("appending {} rows", new_rows.len()))?;
        Ok(())
    }

    fn extend(
        &mut self,
        column: &PlannedColumn,
        batch: &Batch,
        row_mapping: &[usize],
        report: &mut MergeReport,
    ) -> StrataResult<()> {
        let Some(incoming) = column.incoming().map(|i| &batch.columns()[i].values) else {
            return Ok(());
        };
        let row_count = self.store.row_count();
        let mut cells: Vec<Option<Value>> = if column.exists() {
            self.store
                .read_column(column.name())?
                .into_iter()
                .map(Some)
                .collect()
        } else {
            vec![None; row_count]
        };
        if cells.len() != row_count {
            strata_bail!(
                "column {} has {} values for {} rows",
                column.name(),
                cells.len(),
                row_count
            );
        }

        let mut changed = !column.exists();
        for (value, &row) in incoming.iter().zip(row_mapping) {
            let cell = &mut cells[row];
            let replace = match cell.as_ref() {
                None => true,
                Some(current) if current == value || column.is_null(value) => false,
                Some(current) if column.is_null(current) => true,
                Some(current) => {
                    log::warn!(
                        "ignoring value {} for row {} of column {}, it already holds {}",
                        value,
                        row,
                        column.name(),
                        current
                    );
                    report.values_ignored += 1;
                    false
                }
            };
            if replace {
                *cell = Some(value.clone());
                changed = true;
            }
        }
        if !changed {
            return Ok(());
        }

        let values = if cells.iter().any(Option::is_none) {
            let null = column.null()?;
            cells
                .into_iter()
                .map(|cell| cell.unwrap_or_else(|| null.clone()))
                .collect()
        } else {
            cells.into_iter().flatten().collect()
        };
        self.store
            .add_or_extend_column(column.spec().clone(), values, None)
            .with_context(|| format!("writing column {}", column.name()))?;

        let name = column.name().to_string();
        if column.exists() {
            report.columns_extended.push(name);
        } else {
            report.columns_created.push(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_dtype::{DType, Nullability, PType};
    use strata_error::StrataError;

    use super::*;
    use crate::store::MemTable;

    fn utf8(name: &str) -> ColumnSpec {
        ColumnSpec::new(name, "", DType::Utf8(Nullability::NonNullable))
    }

    fn f64_col(name: &str) -> ColumnSpec {
        ColumnSpec::new(name, "", DType::Primitive(PType::F64, Nullability::NonNullable))
    }

    fn i64_col(name: &str) -> ColumnSpec {
        ColumnSpec::new(name, "", DType::Primitive(PType::I64, Nullability::NonNullable))
    }

    fn engine() -> TableEngine<MemTable> {
        TableEngine::try_new(
            MemTable::new(["name"]),
            KeySchema::try_new(["name"]).unwrap(),
            vec![utf8("name")],
            DefaultsConfig::default(),
        )
        .unwrap()
    }

    fn batch(names: &[&str]) -> Batch {
        Batch::new(names.len())
            .with_column(utf8("name"), names.iter().map(|&n| Value::from(n)).collect())
            .unwrap()
    }

    fn with_f64(batch: Batch, name: &str, values: &[f64]) -> Batch {
        batch
            .with_column(f64_col(name), values.iter().map(|&v| Value::from(v)).collect())
            .unwrap()
    }

    fn column(engine: &TableEngine<MemTable>, name: &str) -> Vec<Value> {
        engine.store().read_column(name).unwrap()
    }

    #[test]
    fn merge_is_idempotent() {
        let mut engine = engine();
        let b = with_f64(batch(&["a", "b"]), "p", &[1.0, 2.0]);
        let first = engine.merge(&b).unwrap();
        assert_eq!(first.rows_appended, 2);
        assert_eq!(first.columns_created, vec!["name", "p"]);
        let snapshot = engine.store().clone();

        let second = engine.merge(&b).unwrap();
        assert!(second.is_noop());
        assert_eq!(second.rows_matched, 2);
        assert_eq!(second.row_mapping, first.row_mapping);
        assert_eq!(engine.store(), &snapshot);
    }

    #[test]
    fn back_fill_of_a_new_column() {
        let mut engine = engine();
        // Rows A and B, column p only on A.
        engine.merge(&batch(&["A", "B"])).unwrap();
        engine.merge(&with_f64(batch(&["A"]), "p", &[0.5])).unwrap();
        // Merge C with column q.
        let report = engine.merge(&with_f64(batch(&["C"]), "q", &[7.0])).unwrap();

        assert_eq!(report.rows_appended, 1);
        assert_eq!(report.columns_created, vec!["q"]);
        assert_eq!(
            column(&engine, "q"),
            vec![Value::from(f64::NAN), Value::from(f64::NAN), Value::from(7.0f64)]
        );
        assert_eq!(
            column(&engine, "p"),
            vec![Value::from(0.5f64), Value::from(f64::NAN), Value::from(f64::NAN)]
        );
    }

    #[test]
    fn extension_follows_virtual_ids() {
        let mut engine = engine();
        engine.merge(&with_f64(batch(&["a", "b"]), "p", &[1.0, 2.0])).unwrap();
        engine.merge(&batch(&["c", "d"])).unwrap();
        let report = engine
            .merge(&with_f64(batch(&["d", "b", "c"]), "p", &[4.0, 2.0, 3.0]))
            .unwrap();

        assert_eq!(report.row_mapping, vec![3, 1, 2]);
        assert_eq!(report.columns_extended, vec!["p"]);
        assert_eq!(
            column(&engine, "p"),
            vec![
                Value::from(1.0f64),
                Value::from(2.0f64),
                Value::from(3.0f64),
                Value::from(4.0f64)
            ]
        );
    }

    #[test]
    fn conflicting_values_are_ignored() {
        let mut engine = engine();
        engine.merge(&with_f64(batch(&["a"]), "p", &[1.0])).unwrap();
        let report = engine.merge(&with_f64(batch(&["a"]), "p", &[9.0])).unwrap();
        assert_eq!(report.values_ignored, 1);
        assert!(report.is_noop());
        assert_eq!(column(&engine, "p"), vec![Value::from(1.0f64)]);
    }

    #[test]
    fn any_nan_is_back_filled_not_conflicting() {
        let mut engine = engine();
        engine.merge(&batch(&["a", "b"])).unwrap();
        engine.merge(&with_f64(batch(&["a"]), "p", &[-f64::NAN])).unwrap();

        let report = engine.merge(&with_f64(batch(&["a"]), "p", &[5.0])).unwrap();
        assert_eq!(report.values_ignored, 0);
        assert_eq!(report.columns_extended, vec!["p"]);

        let report = engine
            .merge(&with_f64(batch(&["a", "b"]), "p", &[-f64::NAN, 6.0]))
            .unwrap();
        assert_eq!(report.values_ignored, 0);
        assert_eq!(column(&engine, "p"), vec![Value::from(5.0f64), Value::from(6.0f64)]);
    }

    /// A store whose next write of one column fails.
    #[derive(Debug)]
    struct FailingStore {
        inner: MemTable,
        fail_column: Option<String>,
    }

    impl TableStore for FailingStore {
        fn row_count(&self) -> usize {
            self.inner.row_count()
        }

        fn column_names(&self) -> Vec<String> {
            self.inner.column_names()
        }

        fn column_spec(&self, name: &str) -> Option<&ColumnSpec> {
            self.inner.column_spec(name)
        }

        fn read_column(&self, name: &str) -> StrataResult<Vec<Value>> {
            self.inner.read_column(name)
        }

        fn row_ids(&self) -> &[usize] {
            self.inner.row_ids()
        }

        fn append_rows(
            &mut self,
            values_by_column: Vec<(String, Vec<Value>)>,
        ) -> StrataResult<Vec<usize>> {
            self.inner.append_rows(values_by_column)
        }

        fn add_or_extend_column(
            &mut self,
            spec: ColumnSpec,
            values: Vec<Value>,
            null_fill: Option<Value>,
        ) -> StrataResult<()> {
            if self.fail_column.as_deref() == Some(spec.name()) {
                self.fail_column = None;
                strata_bail!(AssertionFailed: "device full");
            }
            self.inner.add_or_extend_column(spec, values, null_fill)
        }
    }

    #[test]
    fn failed_column_write_is_recovered_by_rerunning_the_merge() {
        let store = FailingStore {
            inner: MemTable::new(["name"]),
            fail_column: Some("gain".to_string()),
        };
        let mut engine = TableEngine::try_new(
            store,
            KeySchema::try_new(["name"]).unwrap(),
            vec![utf8("name")],
            DefaultsConfig::default(),
        )
        .unwrap();
        let b = with_f64(batch(&["a", "b"]), "gain", &[1.0, 2.0]);

        let err = engine.merge(&b).unwrap_err();
        assert!(err.to_string().starts_with("writing column gain: device full"));
        assert!(matches!(err.root(), StrataError::AssertionFailed(..)));
        // The rows landed, the post-hoc column did not.
        assert_eq!(engine.store().row_count(), 2);
        assert!(!engine.store().has_column("gain"));

        let report = engine.merge(&b).unwrap();
        assert_eq!(report.rows_appended, 0);
        assert_eq!(report.rows_matched, 2);
        assert_eq!(report.columns_created, vec!["gain"]);
        assert_eq!(engine.store().row_count(), 2);
        assert_eq!(
            engine.store().read_column("gain").unwrap(),
            vec![Value::from(1.0f64), Value::from(2.0f64)]
        );
    }

    #[test]
    fn rows_are_stable_across_merges() {
        let mut engine = engine();
        let first = engine.merge(&batch(&["x", "y"])).unwrap();
        engine.merge(&batch(&["z"])).unwrap();
        engine.merge(&with_f64(batch(&["w", "x"]), "gain", &[1.0, 2.0])).unwrap();

        assert_eq!(engine.store().row_ids(), &[0, 1, 2, 3]);
        assert_eq!(&column(&engine, "name")[..2], &[Value::from("x"), Value::from("y")]);
        assert_eq!(first.row_ids, vec![0, 1]);
    }

    #[test]
    fn duplicate_ids_in_batch_leave_the_table_untouched() {
        let mut engine = engine();
        engine.merge(&batch(&["a"])).unwrap();
        let err = engine.merge(&batch(&["b", "b"])).unwrap_err();
        assert!(matches!(err, StrataError::IdentityConflict(..)));
        assert_eq!(engine.store().row_count(), 1);
    }

    #[test]
    fn uninferrable_null_fails_before_appending() {
        let mut engine = engine();
        engine.merge(&batch(&["a"])).unwrap();
        let count = i64_col("count");
        let b = batch(&["b"])
            .with_column(count, vec![Value::from(3i64)])
            .unwrap();
        let err = engine.merge(&b).unwrap_err();
        assert!(matches!(err, StrataError::NullInference(..)));
        assert_eq!(engine.store().row_count(), 1);
    }

    #[test]
    fn integer_column_needs_no_null_when_fully_covered() {
        let mut engine = engine();
        let count = i64_col("count");
        let b = batch(&["a", "b"])
            .with_column(count, vec![Value::from(1i64), Value::from(2i64)])
            .unwrap();
        engine.merge(&b).unwrap();
        assert_eq!(column(&engine, "count"), vec![Value::from(1i64), Value::from(2i64)]);
        // The same batch again matches every row, so nothing needs a null.
        assert!(engine.merge(&b).unwrap().is_noop());
    }

    #[test]
    fn reserved_key_reused_with_another_type() {
        let mut engine = engine();
        let b = Batch::new(1)
            .with_column(f64_col("name"), vec![Value::from(1.0f64)])
            .unwrap();
        assert!(matches!(engine.merge(&b), Err(StrataError::Schema(..))));
    }

    #[test]
    fn missing_key_column_is_a_schema_error() {
        let mut engine = engine();
        let b = with_f64(Batch::new(1), "p", &[1.0]);
        assert!(matches!(engine.merge(&b), Err(StrataError::Schema(..))));
    }

    #[test]
    fn keys_must_be_required_strings() {
        assert!(
            TableEngine::try_new(
                MemTable::new(["id"]),
                KeySchema::try_new(["id"]).unwrap(),
                vec![f64_col("id")],
                DefaultsConfig::default(),
            )
            .is_err()
        );
    }
}
