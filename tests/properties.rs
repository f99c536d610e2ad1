use std::collections::BTreeMap;

use proptest::prelude::*;
use vestibule::secrets::vault::auth::SENSITIVE_FIELDS;
use vestibule::secrets::vault::{kv_paths, redact};
use vestibule::secrets::REDACTED;
use vestibule::Environ;

fn pairs() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[A-Z][A-Z0-9_]{0,8}", "[ -~]{0,16}", 0..12)
}

/// Payload keys: sensitive names about half the time, arbitrary names otherwise.
fn field_name() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(SENSITIVE_FIELDS).prop_map(String::from),
        "[a-z_]{1,10}",
    ]
}

proptest! {
    #[test]
    fn safe_merge_never_overwrites(existing in pairs(), incoming in pairs()) {
        let environ = Environ::new();
        environ.merge(existing.clone());
        environ.safe_merge(incoming.clone());

        let map = environ.map();
        for (k, v) in &existing {
            prop_assert_eq!(map.get(k), Some(v));
        }
        for (k, v) in &incoming {
            if !existing.contains_key(k) {
                prop_assert_eq!(map.get(k), Some(v));
            }
        }
    }

    #[test]
    fn disjoint_merges_commute(a in pairs(), b in pairs()) {
        let b: BTreeMap<String, String> =
            b.into_iter().filter(|(k, _)| !a.contains_key(k)).collect();

        let first = Environ::new();
        first.safe_merge(a.clone());
        first.safe_merge(b.clone());

        let second = Environ::new();
        second.safe_merge(b);
        second.safe_merge(a);

        prop_assert_eq!(first.map(), second.map());
    }

    #[test]
    fn slice_is_sorted_and_stable(a in pairs()) {
        let environ = Environ::new();
        environ.merge(a.clone());

        let slice = environ.slice();
        prop_assert_eq!(slice.len(), a.len());
        let mut sorted = slice.clone();
        sorted.sort();
        prop_assert_eq!(&slice, &sorted);
        prop_assert_eq!(slice, environ.slice());
    }

    #[test]
    fn redact_only_touches_sensitive_fields(payload in prop::collection::btree_map(
        field_name(),
        "[a-z0-9]{0,8}",
        0..10,
    )) {
        let redacted = redact(&payload);
        prop_assert_eq!(redacted.len(), payload.len());
        for (k, v) in &payload {
            if SENSITIVE_FIELDS.contains(&k.as_str()) {
                prop_assert_eq!(redacted[k].as_str(), REDACTED);
            } else {
                prop_assert_eq!(&redacted[k], v);
            }
        }
    }

    #[test]
    fn kv_paths_ignore_extra_slashes(
        segments in prop::collection::vec("[a-z0-9]{1,6}", 2..6),
        pad in "/{0,3}",
    ) {
        let clean = segments.join("/");
        let sep = format!("/{}", pad);
        let padded = format!("{}{}{}", pad, segments.join(sep.as_str()), pad);

        let a = kv_paths(&clean).unwrap();
        let b = kv_paths(&padded).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.versioned.split('/').nth(1), Some("data"));
        prop_assert!(!a.legacy.contains("//"));
    }
}
