#![cfg(test)]

use itertools::Itertools;
use strata::dtype::{DType, Nullability, PType};
use strata::error::StrataError;
use strata::scalar::{ColumnSpec, Value};
use strata::{
    CHANNEL_NAME, DefaultsConfig, Element, ElementTable, Entity, EntityTable, MemTable, TableStore,
};

fn f64_spec(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, "", DType::Primitive(PType::F64, Nullability::NonNullable))
}

fn channels(table: &ElementTable) -> Vec<String> {
    table
        .store()
        .column(CHANNEL_NAME)
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn two_sources_produce_three_elements() {
    let mut table = ElementTable::in_memory(DefaultsConfig::default()).unwrap();
    table
        .add_elements(&[Element::new("0", "a"), Element::new("0", "b")], &[])
        .unwrap();

    let quality = ColumnSpec::new("quality", "", DType::Utf8(Nullability::NonNullable));
    let report = table
        .add_elements(
            &[
                Element::new("0", "b").with_property("quality", "good"),
                Element::new("0", "c").with_property("quality", "mua"),
            ],
            &[quality],
        )
        .unwrap();

    assert_eq!(report.row_mapping, vec![1, 2]);
    assert_eq!(channels(&table), vec!["a", "b", "c"]);
    assert!(channels(&table).iter().all_unique());
    assert_eq!(table.store().cell("quality", 0), Some(&Value::from("")));
}

#[test]
fn merging_twice_is_idempotent() {
    let mut table = ElementTable::in_memory(DefaultsConfig::default()).unwrap();
    let elements = [
        Element::new("shank0", "a").with_property("gain", 2.0f64),
        Element::new("shank1", "a"),
    ];
    let gain = [f64_spec("gain")];
    table.add_elements(&elements, &gain).unwrap();
    let snapshot = table.store().clone();

    let report = table.add_elements(&elements, &gain).unwrap();
    assert!(report.is_noop());
    assert_eq!(report.values_ignored, 0);
    assert_eq!(table.store(), &snapshot);
}

#[test]
fn columns_back_fill_older_rows() {
    let mut table = ElementTable::in_memory(DefaultsConfig::default()).unwrap();
    table
        .add_elements(
            &[
                Element::new("0", "a").with_property("p", 0.5f64),
                Element::new("0", "b"),
            ],
            &[f64_spec("p")],
        )
        .unwrap();
    table
        .add_elements(
            &[Element::new("0", "c").with_property("q", 7.0f64)],
            &[f64_spec("q")],
        )
        .unwrap();

    let nan = Value::from(f64::NAN);
    assert_eq!(
        table.store().column("p").unwrap(),
        &[Value::from(0.5f64), nan.clone(), nan.clone()]
    );
    assert_eq!(
        table.store().column("q").unwrap(),
        &[nan.clone(), nan, Value::from(7.0f64)]
    );
}

#[test]
fn unrelated_merges_keep_rows_in_place() {
    let mut table = ElementTable::in_memory(DefaultsConfig::default()).unwrap();
    table
        .add_elements(&[Element::new("0", "a"), Element::new("0", "b")], &[])
        .unwrap();
    let before = table.row_ids().to_vec();

    table
        .add_elements(&[Element::new("1", "x"), Element::new("0", "a")], &[])
        .unwrap();
    assert_eq!(&table.row_ids()[..2], before.as_slice());
    assert_eq!(channels(&table), vec!["a", "b", "x"]);
}

#[test]
fn conflicting_types_are_schema_errors() {
    let mut table = ElementTable::in_memory(DefaultsConfig::default()).unwrap();
    table
        .add_elements(
            &[Element::new("0", "a").with_property("p", 0.5f64)],
            &[f64_spec("p")],
        )
        .unwrap();
    let as_text = ColumnSpec::new("p", "", DType::Utf8(Nullability::NonNullable));
    assert!(matches!(
        table.add_elements(
            &[Element::new("0", "b").with_property("p", "high")],
            &[as_text]
        ),
        Err(StrataError::Schema(..))
    ));
    assert_eq!(table.len(), 1);
}

#[test]
fn entities_refer_to_elements() {
    let mut elements = ElementTable::in_memory(DefaultsConfig::default()).unwrap();
    let report = elements
        .add_elements(&[Element::new("0", "a"), Element::new("0", "b")], &[])
        .unwrap();

    let mut entities = EntityTable::in_memory(DefaultsConfig::default()).unwrap();
    let mut unit = Entity::new(3, vec![0.25, 1.5]);
    unit.electrodes = Some(report.row_ids);
    entities
        .add_entities(&[unit], &[], elements.store())
        .unwrap();
    assert_eq!(
        entities.store().cell("electrodes", 0),
        Some(&Value::ragged_from([0u64, 1]))
    );
}

#[test]
fn tables_survive_a_json_snapshot() {
    let mut table = ElementTable::in_memory(DefaultsConfig::default()).unwrap();
    table
        .add_elements(
            &[Element::new("0", "a").with_property("depth", 120.0f64)],
            &[f64_spec("depth")],
        )
        .unwrap();
    let json = table.store().to_json().unwrap();
    let restored = MemTable::from_json(&json).unwrap();
    assert_eq!(&restored, table.store());

    let mut reopened = ElementTable::try_new(restored, DefaultsConfig::default()).unwrap();
    let report = reopened
        .add_elements(&[Element::new("0", "a"), Element::new("0", "z")], &[])
        .unwrap();
    assert_eq!(report.rows_appended, 1);
    assert_eq!(reopened.store().row_count(), 2);
    assert_eq!(
        reopened.store().cell("depth", 1),
        Some(&Value::from(f64::NAN))
    );
}
