//! Integration tests for metadata stores and record sources

mod fixtures;

use rangeval_catalog::{
    row, DataDictionary, FetchError, Filter, FilterOp, InMemoryStore, MetadataStore,
    MockRecordSource, RecordSource, RowQuery, StoreError,
};
use rangeval_core::{FieldDefinition, FieldType};
use std::sync::Arc;
use std::time::Duration;

fn visit_query(subjid: &str, visitno: &str) -> RowQuery {
    RowQuery {
        table: "visits".to_string(),
        filters: vec![
            Filter { column: "subjid".into(), op: FilterOp::Eq, value: subjid.into() },
            Filter { column: "visitno".into(), op: FilterOp::Eq, value: visitno.into() },
        ],
        limit: 1,
    }
}

#[test]
fn store_trait_object_exposes_study_metadata() {
    let store: Arc<dyn MetadataStore> = Arc::new(fixtures::study_store());

    assert_eq!(store.name(), "InMemory");
    assert!(store.table_exists("ae"));
    assert!(store.table_info("ae").unwrap().log_form);
    assert_eq!(
        store.table_index_columns("vitals").unwrap(),
        vec!["subjid".to_string(), "visitno".to_string()]
    );
    assert_eq!(
        store.field_definition("vitals", "temp").unwrap().codes,
        "35..42:0.1"
    );
}

#[test]
fn concurrent_readers_share_one_store() {
    let store = Arc::new(fixtures::study_store());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.table_fields("vitals").map(|f| f.len()))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Ok(4));
    }
}

#[test]
fn updates_are_visible_through_clones() {
    let store = fixtures::study_store();
    let reader = store.clone();

    store
        .upsert_field(FieldDefinition::new("vitals", "pulse", FieldType::Integer).with_rangeval("between 40 and 180"))
        .unwrap();

    assert_eq!(
        reader.field_definition("vitals", "pulse").unwrap().rangeval,
        "between 40 and 180"
    );
    assert_eq!(
        store.upsert_field(FieldDefinition::new("labs", "alt", FieldType::Integer)),
        Err(StoreError::TableNotFound("labs".into()))
    );
}

#[test]
fn dictionary_round_trips_through_json() {
    let json = r#"{
        "tables": [
            {
                "name": "demog",
                "index_columns": ["subjid"],
                "fields": [
                    { "field": "sex", "type": "radio", "codes": "1=Male;2=Female" },
                    { "field": "dob", "type": "date", "layout": "letpass=2024-01-01" }
                ]
            }
        ]
    }"#;

    let dictionary = DataDictionary::from_json(json).unwrap();
    let store = InMemoryStore::from_dictionary(dictionary.clone()).unwrap();
    assert_eq!(store.table_names(), vec!["demog".to_string()]);
    assert_eq!(store.field_definition("demog", "dob").unwrap().field_type, FieldType::Date);

    let written = serde_json::to_string(&dictionary).unwrap();
    assert_eq!(DataDictionary::from_json(&written).unwrap(), dictionary);
}

#[test]
fn malformed_dictionary_is_reported() {
    assert!(matches!(
        DataDictionary::from_json("{\"tables\": 3}"),
        Err(StoreError::InvalidDictionary(_))
    ));
}

#[tokio::test]
async fn record_source_serves_matching_rows() {
    let source = fixtures::visit_records().await;

    let found = source.fetch_row(&visit_query("101", "2")).await.unwrap();
    assert_eq!(found, Some(row(&[("subjid", "101"), ("visitno", "2"), ("vdate", "2024-02-14")])));

    let missing = source.fetch_row(&visit_query("102", "1")).await.unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn slow_sources_can_be_timed_out() {
    let source = MockRecordSource::new().with_latency(200);
    source.add_row("visits", row(&[("subjid", "101"), ("visitno", "1")])).await;

    let result = tokio::time::timeout(Duration::from_millis(20), source.fetch_row(&visit_query("101", "1"))).await;
    assert!(result.is_err());
    assert_eq!(source.query_count(), 1);
}

#[tokio::test]
async fn record_source_as_trait_object() {
    let source: Arc<dyn RecordSource> = Arc::new(MockRecordSource::new().with_connection_failure());

    assert_eq!(source.name(), "Mock");
    assert!(matches!(
        source.fetch_row(&visit_query("101", "1")).await,
        Err(FetchError::NetworkError(_))
    ));
}

#[tokio::test]
async fn comparison_filters() {
    let source = fixtures::visit_records().await;
    let query = RowQuery {
        table: "visits".to_string(),
        filters: vec![
            Filter { column: "subjid".into(), op: FilterOp::Eq, value: "101".into() },
            Filter { column: "visitno".into(), op: FilterOp::Gt, value: "1".into() },
        ],
        limit: 1,
    };

    let found = source.fetch_row(&query).await.unwrap().unwrap();
    assert_eq!(found.get("visitno").map(String::as_str), Some("2"));
}
