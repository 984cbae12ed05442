//! Property tests for the value algebra: hashing consistent with equality,
//! total ordering, and container laws.

use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use warden::ast::Term;
use warden::value::{Array, Number, Object, Set, Value, Var};

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn scalar_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (-1.0e12f64..1.0e12).prop_map(|f| Value::Number(Number::from(f))),
        "[a-z]{0,8}".prop_map(|s| Value::String(s)),
        "[a-z]{1,6}".prop_map(|s| Value::Var(Var::new(s))),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    scalar_value().prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|elems| {
                Value::Array(Array::new(elems.into_iter().map(Term::from).collect()))
            }),
            prop::collection::vec(inner.clone(), 0..4).prop_map(|elems| {
                Value::Set(Set::from_elems(elems.into_iter().map(Term::from).collect()))
            }),
            prop::collection::vec((inner.clone(), inner), 0..4).prop_map(|pairs| {
                Value::Object(Object::from_pairs(
                    pairs
                        .into_iter()
                        .map(|(k, v)| (Term::from(k), Term::from(v)))
                        .collect(),
                ))
            }),
        ]
    })
}

proptest! {
    #[test]
    fn equal_values_hash_alike(a in value(), b in value()) {
        if a == b {
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }

    #[test]
    fn ordering_is_antisymmetric(a in value(), b in value()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        prop_assert_eq!(a == b, a.cmp(&b) == std::cmp::Ordering::Equal);
    }

    #[test]
    fn ordering_is_transitive(a in value(), b in value(), c in value()) {
        let mut sorted = [a, b, c];
        sorted.sort();
        prop_assert!(sorted[0] <= sorted[1]);
        prop_assert!(sorted[1] <= sorted[2]);
        prop_assert!(sorted[0] <= sorted[2]);
    }

    #[test]
    fn number_forms_compare_numerically(n in any::<i32>()) {
        let plain: Number = n.to_string().parse().expect("parse");
        let decimal: Number = format!("{n}.0").parse().expect("parse");
        prop_assert_eq!(&plain, &decimal);
        prop_assert_eq!(hash_of(&plain), hash_of(&decimal));
        // Textual form is preserved independently of equality.
        prop_assert_eq!(decimal.to_string(), format!("{n}.0"));
    }

    #[test]
    fn set_membership_matches_equality(elems in prop::collection::vec(value(), 0..8)) {
        let set = Set::from_elems(elems.iter().cloned().map(Term::from).collect());
        for v in &elems {
            prop_assert!(set.contains(&Term::from(v.clone())));
        }
        prop_assert!(set.len() <= elems.len());
    }

    #[test]
    fn object_find_returns_inserted_values(
        pairs in prop::collection::vec((scalar_value(), value()), 0..6)
    ) {
        let obj = Value::Object(Object::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (Term::from(k.clone()), Term::from(v.clone())))
                .collect(),
        ));
        // Later duplicates win, so look up through the object itself.
        if let Value::Object(inner) = &obj {
            for (k, expected) in inner.iter() {
                let found = obj.find(std::slice::from_ref(k)).expect("present");
                prop_assert_eq!(found, &expected.value);
            }
        }
    }

    #[test]
    fn object_iteration_is_sorted(
        pairs in prop::collection::vec((scalar_value(), scalar_value()), 0..8)
    ) {
        let obj = Object::from_pairs(
            pairs
                .into_iter()
                .map(|(k, v)| (Term::from(k), Term::from(v)))
                .collect(),
        );
        let keys: Vec<&Term> = obj.keys().collect();
        for pair in keys.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }
}
