use std::collections::BTreeMap;

use strata_dtype::{DType, Nullability, PType};
use strata_error::{StrataResult, strata_bail};
use strata_scalar::{ColumnSpec, Value};

use crate::batch::Batch;
use crate::config::DefaultsConfig;
use crate::element::{check_properties, property_columns};
use crate::engine::{MergeReport, TableEngine};
use crate::identity::KeySchema;
use crate::store::{MemTable, TableStore};

pub const ENTITY_NAME: &str = "entity_name";
pub const SPIKE_TIMES: &str = "spike_times";
pub const WAVEFORM_MEAN: &str = "waveform_mean";
pub const WAVEFORM_SD: &str = "waveform_sd";
pub const ELECTRODES: &str = "electrodes";

const RESERVED: [&str; 5] = [ENTITY_NAME, SPIKE_TIMES, WAVEFORM_MEAN, WAVEFORM_SD, ELECTRODES];

/// One detected unit and its event times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    /// Identifier within the source, used as the name when `name` is absent.
    pub id: u64,
    pub name: Option<String>,
    pub spike_times: Vec<f64>,
    pub waveform_mean: Option<Vec<f64>>,
    pub waveform_sd: Option<Vec<f64>>,
    /// `row_id`s of the element table rows this entity was recorded on.
    pub electrodes: Option<Vec<usize>>,
    pub properties: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(id: u64, spike_times: Vec<f64>) -> Self {
        Self {
            id,
            spike_times,
            ..Default::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// The name the entity is keyed by.
    pub fn entity_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.id.to_string(),
        }
    }
}

fn f64_list() -> DType {
    DType::ragged(DType::Primitive(PType::F64, Nullability::NonNullable))
}

/// The entity table: one row per unit, keyed by entity name.
#[derive(Debug)]
pub struct EntityTable<S = MemTable> {
    engine: TableEngine<S>,
}

impl EntityTable<MemTable> {
    pub fn in_memory(defaults: DefaultsConfig) -> StrataResult<Self> {
        Self::try_new(MemTable::new([ENTITY_NAME]), defaults)
    }
}

impl<S: TableStore> EntityTable<S> {
    pub fn try_new(store: S, defaults: DefaultsConfig) -> StrataResult<Self> {
        let required = vec![
            ColumnSpec::new(
                ENTITY_NAME,
                "name of the entity",
                DType::Utf8(Nullability::NonNullable),
            ),
            ColumnSpec::new(SPIKE_TIMES, "event times of the entity", f64_list()),
        ];
        let engine =
            TableEngine::try_new(store, KeySchema::try_new([ENTITY_NAME])?, required, defaults)?;
        Ok(Self { engine })
    }

    /// Merge entities from one source.
    ///
    /// Electrode references must name rows of `elements`, otherwise nothing is merged.
    pub fn add_entities<E: TableStore + ?Sized>(
        &mut self,
        entities: &[Entity],
        properties: &[ColumnSpec],
        elements: &E,
    ) -> StrataResult<MergeReport> {
        check_properties(properties, &RESERVED)?;
        check_electrodes(entities, elements)?;

        let mut batch = Batch::new(entities.len())
            .with_column(
                ColumnSpec::new(ENTITY_NAME, "", DType::Utf8(Nullability::NonNullable)),
                entities.iter().map(|e| Value::from(e.entity_name())).collect(),
            )?
            .with_column(
                ColumnSpec::new(SPIKE_TIMES, "", f64_list()),
                entities
                    .iter()
                    .map(|e| Value::ragged_from(e.spike_times.iter().copied()))
                    .collect(),
            )?;

        let waveforms: [(&str, &str, fn(&Entity) -> Option<&Vec<f64>>); 2] = [
            (WAVEFORM_MEAN, "mean waveform of the entity", |e| {
                e.waveform_mean.as_ref()
            }),
            (WAVEFORM_SD, "standard deviation of the waveform", |e| {
                e.waveform_sd.as_ref()
            }),
        ];
        for (name, description, get) in waveforms {
            if entities.iter().any(|e| get(e).is_some()) {
                let values = entities
                    .iter()
                    .map(|e| match get(e) {
                        Some(samples) => Value::ragged_from(samples.iter().copied()),
                        None => Value::empty_ragged(),
                    })
                    .collect();
                batch =
                    batch.with_column(ColumnSpec::new(name, description, f64_list()), values)?;
            }
        }
        if entities.iter().any(|e| e.electrodes.is_some()) {
            let values = entities
                .iter()
                .map(|e| {
                    Value::ragged_from(
                        e.electrodes
                            .iter()
                            .flatten()
                            .map(|&row_id| row_id as u64),
                    )
                })
                .collect();
            batch = batch.with_column(
                ColumnSpec::new(
                    ELECTRODES,
                    "row ids of the elements the entity was recorded on",
                    DType::ragged(DType::Primitive(PType::U64, Nullability::NonNullable)),
                ),
                values,
            )?;
        }
        let batch = property_columns(batch, properties, entities.iter().map(|e| &e.properties))?;

        self.engine.merge(&batch)
    }

    pub fn engine(&self) -> &TableEngine<S> {
        &self.engine
    }

    pub fn store(&self) -> &S {
        self.engine.store()
    }

    pub fn len(&self) -> usize {
        self.engine.store().row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_electrodes<E: TableStore + ?Sized>(entities: &[Entity], elements: &E) -> StrataResult<()> {
    let row_ids = elements.row_ids();
    for entity in entities {
        for &row_id in entity.electrodes.iter().flatten() {
            // Row ids are assigned in increasing order.
            if row_ids.binary_search(&row_id).is_err() {
                log::debug!(
                    "entity {} refers to unknown element {}",
                    entity.entity_name(),
                    row_id
                );
                strata_bail!(OutOfBounds: row_id, 0, row_ids.last().map_or(0, |last| last + 1));
            }
        }
    }
    Ok(())
}
