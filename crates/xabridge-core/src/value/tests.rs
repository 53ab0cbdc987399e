use super::*;

#[test]
fn null_sorts_first_and_ranks_are_stable() {
    let mut values = vec![
        Value::Text("a".into()),
        Value::Int(5),
        Value::Null,
        Value::Bool(true),
    ];
    values.sort();

    assert_eq!(
        values,
        vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(5),
            Value::Text("a".into()),
        ]
    );
}

#[test]
fn same_variant_compares_by_payload() {
    assert_eq!(Value::Int(-1).cmp(&Value::Int(2)), Ordering::Less);
    assert_eq!(
        Value::Text("b".into()).cmp(&Value::Text("a".into())),
        Ordering::Greater
    );
}

#[test]
fn int_and_uint_are_distinct_values() {
    assert_ne!(Value::Int(1), Value::Uint(1));
    assert_ne!(Value::Int(1).cmp(&Value::Uint(1)), Ordering::Equal);
}

#[test]
fn option_none_maps_to_null() {
    assert_eq!(Value::from(None::<i64>), Value::Null);
    assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
}
