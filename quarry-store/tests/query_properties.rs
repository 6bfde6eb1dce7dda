//! Property suite: the SQL compilation of a predicate agrees with its
//! in-memory evaluation, and `count` agrees with `list`.

mod common;

use common::open_memory_store;
use proptest::prelude::*;
use quarry_types::{Literal, Predicate, Range, Recipe};
use serde_json::{json, Value};

fn payload_strategy() -> impl Strategy<Value = Value> {
    (
        proptest::option::of(prop_oneof![
            Just("alpha"),
            Just("beta"),
            Just("gamma")
        ]),
        proptest::option::of(0i64..4),
        "[a-c]{0,3}",
    )
        .prop_map(|(status, score, tag)| {
            let mut payload = serde_json::Map::new();
            if let Some(status) = status {
                payload.insert("status".to_string(), json!(status));
            }
            if let Some(score) = score {
                payload.insert("score".to_string(), json!(score));
            }
            payload.insert("tag".to_string(), json!(tag));
            Value::Object(payload)
        })
}

fn key_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("status"), Just("score"), Just("tag")]
}

fn literal_strategy() -> impl Strategy<Value = Literal> {
    prop_oneof![
        prop_oneof![Just("alpha"), Just("beta"), Just("delta")].prop_map(Literal::from),
        (0i64..5).prop_map(Literal::from),
        Just(Literal::Null),
    ]
}

fn predicate_strategy() -> impl Strategy<Value = Predicate> {
    let leaf = prop_oneof![
        (key_strategy(), literal_strategy())
            .prop_map(|(k, l)| Predicate::equal(k, l)),
        (key_strategy(), literal_strategy())
            .prop_map(|(k, l)| Predicate::not_equal(k, l)),
        (
            key_strategy(),
            proptest::collection::vec(literal_strategy(), 0..3)
        )
            .prop_map(|(k, ls)| Predicate::is_in(k, ls)),
        (key_strategy(), "[a-c]{0,2}").prop_map(|(k, s)| Predicate::contains(k, s)),
    ];
    leaf.prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..3).prop_map(Predicate::and),
            proptest::collection::vec(inner, 0..3).prop_map(Predicate::or),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn listed_records_satisfy_the_predicate_and_count_agrees(
        payloads in proptest::collection::vec(payload_strategy(), 0..12),
        predicate in predicate_strategy(),
    ) {
        let store = open_memory_store();
        for payload in &payloads {
            store.main_context().create("item", payload.clone());
        }
        store.save().unwrap();

        let recipe = Recipe::new().filtered(predicate.clone());
        let listed = store.main_context().list("item", &recipe);
        let counted = store
            .main_context()
            .count("item", Some(&predicate), Range::All);

        prop_assert_eq!(listed.len(), counted);
        for record in &listed {
            prop_assert!(
                predicate.matches(&record.data()),
                "listed record {} does not satisfy {:?}",
                record.id(),
                predicate
            );
        }
        let expected = payloads.iter().filter(|p| predicate.matches(p)).count();
        prop_assert_eq!(counted, expected, "predicate {:?}", predicate);
    }

    #[test]
    fn window_never_exceeds_limit_or_starts_before_offset(
        payloads in proptest::collection::vec(payload_strategy(), 0..10),
        offset in 0u64..12,
        limit in 0u64..12,
    ) {
        let store = open_memory_store();
        for payload in &payloads {
            store.main_context().create("item", payload.clone());
        }
        store.save().unwrap();

        let all = store.main_context().list("item", &Recipe::new());
        let windowed = store
            .main_context()
            .list("item", &Recipe::new().window(offset, limit));

        prop_assert!(windowed.len() as u64 <= limit);
        let expected: Vec<_> = all
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|r| r.id())
            .collect();
        let got: Vec<_> = windowed.iter().map(|r| r.id()).collect();
        prop_assert_eq!(got, expected);
    }
}
