use super::*;

fn columns(pairs: &[(&str, i64)]) -> ColumnValues {
    ColumnValues::try_from_pairs(pairs.iter().map(|(c, v)| (*c, *v))).unwrap()
}

#[test]
fn column_values_preserve_insertion_order() {
    let cols = columns(&[("b", 2), ("a", 1), ("c", 3)]);
    let names = cols.iter().map(|(name, _)| name).collect::<Vec<_>>();

    assert_eq!(names, vec!["b", "a", "c"]);
}

#[test]
fn column_values_reject_duplicates() {
    let err = ColumnValues::try_from_pairs([("id", 1), ("id", 2)]).unwrap_err();

    assert_eq!(
        err,
        MutationError::DuplicateColumn {
            column: "id".into()
        }
    );
}

#[test]
fn with_replaces_existing_binding() {
    let cols = ColumnValues::new().with("id", 1).with("name", "a").with("id", 9);

    assert_eq!(cols.len(), 2);
    assert_eq!(cols.get("id"), Some(&Value::Int(9)));
}

#[test]
fn key_for_follows_requested_order() {
    let cols = columns(&[("b", 2), ("a", 1)]);

    assert_eq!(
        cols.key_for(&["a", "b"]),
        Some(Key::new(vec![Value::Int(1), Value::Int(2)]))
    );
    assert_eq!(cols.key_for(&["a", "missing"]), None);
}

#[test]
fn write_mutations_validate() {
    let insert = Mutation::insert("FOO", columns(&[("id", 1)]));

    assert_eq!(insert.kind(), MutationKind::Insert);
    assert!(insert.key_set().is_none());
    insert.validate().unwrap();
}

#[test]
fn write_without_columns_is_rejected() {
    let err = Mutation::update("FOO", ColumnValues::new())
        .validate()
        .unwrap_err();

    assert!(matches!(err, MutationError::EmptyColumns { .. }));
}

#[test]
fn delete_requires_non_empty_key() {
    Mutation::delete("FOO", KeySet::key(Key::single(1)))
        .validate()
        .unwrap();

    let err = Mutation::delete("FOO", KeySet::key(Key::new(Vec::new())))
        .validate()
        .unwrap_err();
    assert!(matches!(err, MutationError::EmptyKey { .. }));
}

#[test]
fn empty_table_is_rejected() {
    let err = Mutation::delete("", KeySet::All).validate().unwrap_err();

    assert_eq!(err, MutationError::EmptyTable);
}

#[test]
fn prefix_range_matches_keys_with_prefix() {
    let range = KeyRange::prefix(Key::single("x1"));

    assert!(range.contains(&Key::new(vec!["x1".into(), Value::Int(0)])));
    assert!(range.contains(&Key::new(vec!["x1".into(), Value::Int(99)])));
    assert!(!range.contains(&Key::new(vec!["x2".into(), Value::Int(0)])));
    assert!(!range.contains(&Key::new(vec!["x0".into(), Value::Int(0)])));
}

#[test]
fn open_bounds_exclude_endpoints() {
    let range = KeyRange::new(
        Key::single(1),
        BoundKind::Open,
        Key::single(3),
        BoundKind::Open,
    );

    assert!(!range.contains(&Key::single(1)));
    assert!(range.contains(&Key::single(2)));
    assert!(!range.contains(&Key::single(3)));
}

#[test]
fn closed_open_range_includes_start_only() {
    let range = KeyRange::closed_open(Key::single(1), Key::single(3));

    assert!(range.contains(&Key::single(1)));
    assert!(!range.contains(&Key::single(3)));
}

#[test]
fn display_is_readable() {
    let delete = Mutation::delete("FOO", KeySet::key(Key::single(1)));

    assert_eq!(delete.to_string(), "delete FOO key [1]");
}
