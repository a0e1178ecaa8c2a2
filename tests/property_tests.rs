//! Property-based tests for parameter resolution and connection keys.
//!
//! These verify that resolution is deterministic, that key equality tracks
//! every identity field, and that host normalization behaves the same for
//! all inputs.

use proptest::prelude::*;

use dbglue::core::db::params::{resolve, NoDefaults};
use dbglue::ConnectOptions;

fn arb_name() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,19}".prop_map(|s: String| s)
}

fn arb_password() -> impl Strategy<Value = String> {
    "[ -~]{0,24}".prop_map(|s: String| s)
}

proptest! {
    #[test]
    fn resolution_is_deterministic(
        db in arb_name(),
        user in arb_name(),
        pass in arb_password(),
        host in arb_name(),
        port in proptest::option::of(1u16..),
    ) {
        let mut opts = ConnectOptions::new(db).user(user).password(pass).host(host);
        opts.port = port;

        let a = resolve(&opts, &NoDefaults, None).unwrap();
        let b = resolve(&opts, &NoDefaults, None).unwrap();
        prop_assert_eq!(a.key, b.key);
    }

    #[test]
    fn password_is_part_of_the_key(
        db in arb_name(),
        user in arb_name(),
        pass in arb_password(),
    ) {
        let base = ConnectOptions::new(db.clone()).user(user.clone()).password(pass.clone());
        let changed = ConnectOptions::new(db).user(user).password(format!("{}x", pass));

        let a = resolve(&base, &NoDefaults, None).unwrap();
        let b = resolve(&changed, &NoDefaults, None).unwrap();
        prop_assert_ne!(a.key, b.key);
    }

    #[test]
    fn host_none_always_normalizes_to_local(
        db in arb_name(),
        user in arb_name(),
    ) {
        let opts = ConnectOptions::new(db).user(user).password("").host("none");
        let resolved = resolve(&opts, &NoDefaults, None).unwrap();
        prop_assert_eq!(resolved.key.host, "");
    }

    #[test]
    fn positive_timeouts_are_preserved(
        db in arb_name(),
        secs in 0.001f64..120.0,
    ) {
        let opts = ConnectOptions::new(db).user("u").password("").timeout(secs);
        let resolved = resolve(&opts, &NoDefaults, None).unwrap();
        let timeout = resolved.timeout.unwrap();
        prop_assert!((timeout.as_secs_f64() - secs).abs() < 1e-9);
    }

    #[test]
    fn missing_database_always_fails(
        user in arb_name(),
        pass in arb_password(),
    ) {
        let opts = ConnectOptions::default().user(user).password(pass).no_abort(true);
        prop_assert!(resolve(&opts, &NoDefaults, None).is_err());
    }
}
