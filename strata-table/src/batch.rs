use strata_error::{StrataResult, strata_bail};
use strata_scalar::{ColumnSpec, Value};

/// One column of a [`Batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchColumn {
    pub spec: ColumnSpec,
    pub values: Vec<Value>,
}

/// The rows contributed by one source in one merge call, stored column-wise.
///
/// A batch is one virtual-id namespace: every row of it is resolved against the table at once.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    num_rows: usize,
    columns: Vec<BatchColumn>,
}

impl Batch {
    pub fn new(num_rows: usize) -> Self {
        Self {
            num_rows,
            columns: Vec::new(),
        }
    }

    /// Add a column, checking its length and the type of every value.
    pub fn with_column(mut self, spec: ColumnSpec, values: Vec<Value>) -> StrataResult<Self> {
        if values.len() != self.num_rows {
            strata_bail!(
                "column {} has {} values for a batch of {} rows",
                spec.name(),
                values.len(),
                self.num_rows
            );
        }
        if self.column(spec.name()).is_some() {
            strata_bail!(Schema: "column {} appears twice in one batch", spec.name());
        }
        values.iter().try_for_each(|value| spec.check_value(value))?;
        self.columns.push(BatchColumn { spec, values });
        Ok(self)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn columns(&self) -> &[BatchColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&BatchColumn> {
        self.columns.iter().find(|c| c.spec.name() == name)
    }

    pub fn specs(&self) -> Vec<ColumnSpec> {
        self.columns.iter().map(|c| c.spec.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use strata_dtype::{DType, Nullability, PType};

    use super::*;

    fn spec(name: &str) -> ColumnSpec {
        ColumnSpec::new(name, "", DType::Primitive(PType::I32, Nullability::NonNullable))
    }

    #[test]
    fn arity_is_checked() {
        assert!(Batch::new(2).with_column(spec("x"), vec![Value::from(1i32)]).is_err());
    }

    #[test]
    fn names_are_unique() {
        let batch = Batch::new(1)
            .with_column(spec("x"), vec![Value::from(1i32)])
            .unwrap();
        assert!(batch.with_column(spec("x"), vec![Value::from(2i32)]).is_err());
    }

    #[test]
    fn values_are_type_checked() {
        assert!(
            Batch::new(1)
                .with_column(spec("x"), vec![Value::from(1.0f64)])
                .is_err()
        );
    }
}
