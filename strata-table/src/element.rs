use std::collections::BTreeMap;

use itertools::Itertools;
use strata_dtype::{DType, Nullability, PType};
use strata_error::{StrataResult, strata_bail};
use strata_scalar::{ColumnSpec, Value};

use crate::batch::Batch;
use crate::config::DefaultsConfig;
use crate::engine::{MergeReport, TableEngine};
use crate::group::GroupCatalog;
use crate::identity::KeySchema;
use crate::store::{MemTable, TableStore};

pub const GROUP_NAME: &str = "group_name";
pub const SUB_ELEMENT_NAME: &str = "sub_element_name";
pub const CHANNEL_NAME: &str = "channel_name";
pub const LOCATION: &str = "location";
pub const REL_X: &str = "rel_x";
pub const REL_Y: &str = "rel_y";
pub const REL_Z: &str = "rel_z";

const ELEMENT_KEYS: [&str; 3] = [GROUP_NAME, SUB_ELEMENT_NAME, CHANNEL_NAME];
const RESERVED: [&str; 7] = [
    GROUP_NAME,
    SUB_ELEMENT_NAME,
    CHANNEL_NAME,
    LOCATION,
    REL_X,
    REL_Y,
    REL_Z,
];

/// One physical recording site as a source describes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Falls back to the configured default group when absent or empty.
    pub group_name: Option<String>,
    pub sub_element_name: Option<String>,
    pub channel_name: String,
    pub location: Option<String>,
    pub rel_x: Option<f64>,
    pub rel_y: Option<f64>,
    pub rel_z: Option<f64>,
    /// Extra properties, keyed by column name.
    pub properties: BTreeMap<String, Value>,
}

impl Element {
    pub fn new(group_name: impl Into<String>, channel_name: impl Into<String>) -> Self {
        Self {
            group_name: Some(group_name.into()),
            channel_name: channel_name.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

fn utf8_column(name: &str, description: &str) -> ColumnSpec {
    ColumnSpec::new(name, description, DType::Utf8(Nullability::NonNullable))
}

fn offset_column(name: &str) -> ColumnSpec {
    ColumnSpec::new(
        name,
        "offset of the element from its group origin",
        DType::Primitive(PType::F64, Nullability::NonNullable),
    )
}

/// Check that extra property columns do not shadow the schema.
pub(crate) fn check_properties(properties: &[ColumnSpec], reserved: &[&str]) -> StrataResult<()> {
    if let Some(spec) = properties.iter().find(|s| reserved.contains(&s.name())) {
        strata_bail!(
            Schema: "property {} reuses a reserved column name",
            spec.name()
        );
    }
    if let Some(name) = properties.iter().map(ColumnSpec::name).duplicates().next() {
        strata_bail!(Schema: "property {} is declared twice", name);
    }
    Ok(())
}

/// Build one batch column per declared property, resolving rows that leave it out to its null.
pub(crate) fn property_columns<'a, I>(
    mut batch: Batch,
    properties: &[ColumnSpec],
    rows: I,
) -> StrataResult<Batch>
where
    I: Iterator<Item = &'a BTreeMap<String, Value>> + Clone,
{
    if let Some(name) = rows
        .clone()
        .flat_map(BTreeMap::keys)
        .find(|name| !properties.iter().any(|spec| spec.name() == name.as_str()))
    {
        strata_bail!(Schema: "property {} has no column definition", name);
    }
    for spec in properties {
        let values = rows
            .clone()
            .map(|row| match row.get(spec.name()) {
                Some(value) => Ok(value.clone()),
                None => spec.resolve_null(),
            })
            .collect::<StrataResult<Vec<_>>>()?;
        batch = batch.with_column(spec.clone(), values)?;
    }
    Ok(batch)
}

/// The element table: one row per recording site, keyed by group, sub-element and channel name.
#[derive(Debug)]
pub struct ElementTable<S = MemTable> {
    engine: TableEngine<S>,
    groups: GroupCatalog,
}

impl ElementTable<MemTable> {
    pub fn in_memory(defaults: DefaultsConfig) -> StrataResult<Self> {
        Self::try_new(MemTable::new(ELEMENT_KEYS), defaults)
    }
}

impl<S: TableStore> ElementTable<S> {
    pub fn try_new(store: S, defaults: DefaultsConfig) -> StrataResult<Self> {
        let required = vec![
            utf8_column(GROUP_NAME, "name of the group the element belongs to"),
            utf8_column(SUB_ELEMENT_NAME, "name of the contact within the group, if any"),
            utf8_column(CHANNEL_NAME, "acquisition channel of the element"),
            utf8_column(LOCATION, "location of the element")
                .with_null_value(defaults.location.as_str())?,
        ];
        let engine = TableEngine::try_new(
            store,
            KeySchema::try_new(ELEMENT_KEYS)?,
            required,
            defaults,
        )?;
        Ok(Self {
            engine,
            groups: GroupCatalog::default(),
        })
    }

    /// Merge elements from one source, with `properties` declaring their extra columns.
    ///
    /// The groups the elements name are registered in the [`GroupCatalog`] once the merge has
    /// succeeded.
    pub fn add_elements(
        &mut self,
        elements: &[Element],
        properties: &[ColumnSpec],
    ) -> StrataResult<MergeReport> {
        check_properties(properties, &RESERVED)?;
        let defaults = self.engine.defaults();

        let group_names: Vec<String> = elements
            .iter()
            .map(|e| match e.group_name.as_deref() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => defaults.group_name.clone(),
            })
            .collect();
        if let Some(row) = elements.iter().position(|e| e.channel_name.is_empty()) {
            strata_bail!(
                "element {} of group {} has an empty channel name",
                row,
                group_names[row]
            );
        }

        let strings = |f: fn(&Element) -> Option<&str>, fallback: &str| -> Vec<Value> {
            elements
                .iter()
                .map(|e| Value::from(f(e).unwrap_or(fallback)))
                .collect()
        };
        let mut batch = Batch::new(elements.len())
            .with_column(
                utf8_column(GROUP_NAME, ""),
                group_names.iter().map(|g| Value::from(g.as_str())).collect(),
            )?
            .with_column(
                utf8_column(SUB_ELEMENT_NAME, ""),
                strings(|e| e.sub_element_name.as_deref(), ""),
            )?
            .with_column(
                utf8_column(CHANNEL_NAME, ""),
                strings(|e| Some(e.channel_name.as_str()), ""),
            )?
            .with_column(
                utf8_column(LOCATION, ""),
                strings(|e| e.location.as_deref(), &defaults.location),
            )?;

        let offsets: [(&str, fn(&Element) -> Option<f64>); 3] = [
            (REL_X, |e| e.rel_x),
            (REL_Y, |e| e.rel_y),
            (REL_Z, |e| e.rel_z),
        ];
        for (name, get) in offsets {
            if elements.iter().any(|e| get(e).is_some()) {
                let values = elements
                    .iter()
                    .map(|e| Value::from(get(e).unwrap_or(f64::NAN)))
                    .collect();
                batch = batch.with_column(offset_column(name), values)?;
            }
        }
        let batch = property_columns(batch, properties, elements.iter().map(|e| &e.properties))?;

        let report = self.engine.merge(&batch)?;
        let defaults = self.engine.defaults().clone();
        for group in group_names.iter().unique() {
            self.groups.ensure_group(group, &defaults)?;
        }
        Ok(report)
    }

    pub fn groups(&self) -> &GroupCatalog {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut GroupCatalog {
        &mut self.groups
    }

    pub fn engine(&self) -> &TableEngine<S> {
        &self.engine
    }

    pub fn store(&self) -> &S {
        self.engine.store()
    }

    pub fn row_ids(&self) -> &[usize] {
        self.engine.store().row_ids()
    }

    pub fn len(&self) -> usize {
        self.engine.store().row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
