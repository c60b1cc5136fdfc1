//! Property tests for the type codec round-trip law.

use chrono::DateTime;
use proptest::prelude::*;
use sqlentity_core::LogicalType;
use sqlentity_core::Value;
use sqlentity_core::codec::{deserialize, serialize, validate_type};

fn json_strategy(max_depth: u32) -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::Bool),
        any::<i64>().prop_map(|v| serde_json::Value::Number(v.into())),
        ".{0,12}".prop_map(serde_json::Value::String),
    ];
    leaf.prop_recursive(max_depth, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
        ]
    })
}

fn object_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop::collection::btree_map("[a-z_]{1,6}", json_strategy(2), 0..5)
        .prop_map(|map| serde_json::Value::Object(map.into_iter().collect()))
}

fn array_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop::collection::vec(json_strategy(2), 0..5).prop_map(serde_json::Value::Array)
}

fn round_trip(value: &Value, ty: LogicalType) -> Value {
    let stored = serialize(value, ty).expect("serialize");
    deserialize(&stored, ty, "field").expect("deserialize")
}

proptest! {
    #[test]
    fn string_round_trips(s in ".*") {
        let v = Value::Text(s);
        prop_assert_eq!(round_trip(&v, LogicalType::String), v);
    }

    #[test]
    fn integer_round_trips(i in any::<i64>()) {
        let v = Value::BigInt(i);
        prop_assert_eq!(round_trip(&v, LogicalType::Number), v);
    }

    #[test]
    fn finite_float_round_trips(f in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
        let v = Value::Double(f);
        prop_assert_eq!(round_trip(&v, LogicalType::Number), v);
    }

    #[test]
    fn boolean_round_trips(b in any::<bool>()) {
        let v = Value::Bool(b);
        prop_assert_eq!(round_trip(&v, LogicalType::Boolean), v);
    }

    #[test]
    fn date_round_trips_by_instant(secs in -2_000_000_000i64..4_000_000_000i64, nanos in 0u32..1_000_000_000u32) {
        let ts = DateTime::from_timestamp(secs, nanos).expect("in range");
        let back = round_trip(&Value::TimestampTz(ts), LogicalType::Date);
        prop_assert_eq!(back.as_timestamp().copied(), Some(ts));
    }

    #[test]
    fn object_round_trips_deeply(obj in object_strategy()) {
        let v = Value::Json(obj);
        prop_assert_eq!(round_trip(&v, LogicalType::Object), v);
    }

    #[test]
    fn array_round_trips_deeply(arr in array_strategy()) {
        let v = Value::Json(arr);
        prop_assert_eq!(round_trip(&v, LogicalType::Array), v);
    }

    #[test]
    fn non_finite_numbers_never_serialize(f in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(f64::NEG_INFINITY)]) {
        prop_assert!(serialize(&Value::Double(f), LogicalType::Number).is_err());
        prop_assert!(validate_type(&Value::Double(f), LogicalType::Number, "n").is_err());
    }

    #[test]
    fn garbage_dates_are_rejected(s in "[a-z]{1,10}") {
        prop_assert!(serialize(&Value::Text(s), LogicalType::Date).is_err());
    }
}
