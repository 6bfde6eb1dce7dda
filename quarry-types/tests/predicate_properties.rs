//! Pure properties of the predicate algebra's in-memory evaluation.

use proptest::prelude::*;
use quarry_types::{Literal, Predicate};
use serde_json::{json, Value};

fn payload_strategy() -> impl Strategy<Value = Value> {
    (
        proptest::option::of(prop_oneof![Just("alpha"), Just("beta")]),
        proptest::option::of(0i64..4),
    )
        .prop_map(|(status, score)| {
            let mut payload = serde_json::Map::new();
            if let Some(status) = status {
                payload.insert("status".to_string(), json!(status));
            }
            if let Some(score) = score {
                payload.insert("score".to_string(), json!(score));
            }
            Value::Object(payload)
        })
}

fn literal_strategy() -> impl Strategy<Value = Literal> {
    prop_oneof![
        prop_oneof![Just("alpha"), Just("beta"), Just("delta")].prop_map(Literal::from),
        (0i64..5).prop_map(Literal::from),
        Just(Literal::Null),
    ]
}

fn leaf_strategy() -> impl Strategy<Value = Predicate> {
    let key = prop_oneof![Just("status"), Just("score")];
    prop_oneof![
        (key.clone(), literal_strategy()).prop_map(|(k, l)| Predicate::equal(k, l)),
        (key, literal_strategy()).prop_map(|(k, l)| Predicate::not_equal(k, l)),
    ]
}

proptest! {
    #[test]
    fn singleton_compounds_are_transparent(
        payload in payload_strategy(),
        predicate in leaf_strategy(),
    ) {
        let and = Predicate::and(vec![predicate.clone()]);
        let or = Predicate::or(vec![predicate.clone()]);
        prop_assert_eq!(and.matches(&payload), predicate.matches(&payload));
        prop_assert_eq!(or.matches(&payload), predicate.matches(&payload));
    }

    #[test]
    fn never_matches_nothing(payload in payload_strategy()) {
        prop_assert!(!Predicate::Never.matches(&payload));
        prop_assert!(!Predicate::is_in("status", vec![]).matches(&payload));
    }

    #[test]
    fn singleton_membership_equals_equality(
        payload in payload_strategy(),
        literal in literal_strategy(),
    ) {
        let membership = Predicate::is_in("status", vec![literal.clone()]);
        let equality = Predicate::equal("status", literal);
        prop_assert_eq!(membership.matches(&payload), equality.matches(&payload));
    }

    #[test]
    fn equal_and_not_equal_never_both_match(
        payload in payload_strategy(),
        literal in literal_strategy(),
    ) {
        let eq = Predicate::equal("score", literal.clone());
        let ne = Predicate::not_equal("score", literal);
        prop_assert!(!(eq.matches(&payload) && ne.matches(&payload)));
    }
}
