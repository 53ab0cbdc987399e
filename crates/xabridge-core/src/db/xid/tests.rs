use super::*;
use proptest::prelude::*;
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

fn hash_of(xid: &Xid) -> u64 {
    let mut hasher = DefaultHasher::new();
    xid.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn key_roundtrip_preserves_all_fields() {
    let xid = Xid::try_new(7, b"gtrid-1".to_vec(), b"bq".to_vec()).unwrap();
    let decoded = Xid::from_key(&xid.key()).unwrap();

    assert_eq!(decoded, xid);
    assert_eq!(decoded.format_id(), 7);
    assert_eq!(decoded.global_id(), b"gtrid-1");
    assert_eq!(decoded.branch_qualifier(), b"bq");
}

#[test]
fn independently_built_xids_are_equal_and_hash_equal() {
    let a = Xid::try_new(1, vec![1, 2, 3], vec![9]).unwrap();
    let b = Xid::try_new(1, [1u8, 2, 3].as_slice(), [9u8].as_slice()).unwrap();

    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
}

#[test]
fn padded_and_unpadded_keys_decode_to_equal_xids() {
    // "AQ" and "AQ==" both encode the single byte 0x01.
    let unpadded = Xid::from_key("3.AQ.AgM").unwrap();
    let padded = Xid::from_key("3.AQ==.AgM=").unwrap();

    assert_eq!(unpadded, padded);
    assert_eq!(hash_of(&unpadded), hash_of(&padded));
    assert_eq!(padded.key(), "3.AQ.AgM");
}

#[test]
fn differing_branch_qualifier_is_not_equal() {
    let a = Xid::try_new(1, vec![1], vec![1]).unwrap();
    let b = Xid::try_new(1, vec![1], vec![2]).unwrap();

    assert_ne!(a, b);
    assert_ne!(a.key(), b.key());
}

#[test]
fn negative_format_id_roundtrips() {
    let xid = Xid::try_new(-1, vec![0xFF], Vec::new()).unwrap();

    assert_eq!(Xid::from_key(&xid.key()).unwrap(), xid);
}

#[test]
fn rejects_empty_global_id() {
    assert_eq!(
        Xid::try_new(0, Vec::new(), Vec::new()).unwrap_err(),
        XidError::EmptyGlobalId
    );
}

#[test]
fn rejects_oversized_parts() {
    let long = vec![0u8; MAX_GLOBAL_ID_BYTES + 1];

    assert!(matches!(
        Xid::try_new(0, long.clone(), Vec::new()),
        Err(XidError::GlobalIdTooLong { .. })
    ));
    assert!(matches!(
        Xid::try_new(0, vec![1], long),
        Err(XidError::BranchQualifierTooLong { .. })
    ));
}

#[test]
fn rejects_malformed_keys() {
    assert!(matches!(
        Xid::from_key("1.AQ"),
        Err(XidError::MalformedKey { .. })
    ));
    assert!(matches!(
        Xid::from_key("1.AQ.AQ.AQ"),
        Err(XidError::MalformedKey { .. })
    ));
    assert!(matches!(
        Xid::from_key("x.AQ.AQ"),
        Err(XidError::InvalidFormatId { .. })
    ));
    assert!(matches!(
        Xid::from_key("1.!!.AQ"),
        Err(XidError::InvalidEncoding {
            part: "global id",
            ..
        })
    ));
}

proptest! {
    #[test]
    fn key_is_stable_and_decodes(
        format_id in any::<i32>(),
        global in prop::collection::vec(any::<u8>(), 1..=MAX_GLOBAL_ID_BYTES),
        branch in prop::collection::vec(any::<u8>(), 0..=MAX_BRANCH_QUALIFIER_BYTES),
    ) {
        let xid = Xid::try_new(format_id, global, branch).unwrap();
        let key = xid.key();

        prop_assert_eq!(&Xid::from_key(&key).unwrap(), &xid);
        prop_assert_eq!(key, xid.key());
    }
}
