//! End-to-end policy scenarios loaded from YAML.

use std::collections::BTreeMap;

use sar_core::resolve;
use sar_policy::{AuthorizationConfig, Decision, Operation, Principal};

fn load(yaml: &str) -> sar_policy::LoadedAuthorization {
    AuthorizationConfig::from_yaml(yaml).unwrap().load().unwrap()
}

fn principal(loaded: &sar_policy::LoadedAuthorization, id: &str) -> Principal {
    loaded
        .credentials
        .iter()
        .find(|c| c.principal.id() == id)
        .map(|c| c.principal.clone())
        .unwrap()
}

const TEAM_A: &str = r#"
enabled: true
principals:
  - {id: alice, token: a-token}
  - {id: bob, token: b-token}
rules:
  - pattern: "team-a/*"
    operation: write
    principal: {id: alice}
    effect: allow
"#;

#[test]
fn team_a_alice_bob_anyone() {
    let loaded = load(TEAM_A);
    let id = resolve("team-a/lib/1.0").unwrap();
    let policy = &loaded.policy;

    assert_eq!(
        policy.authorize(&principal(&loaded, "alice"), Operation::Write, &id),
        Decision::Allow
    );
    assert_eq!(
        policy.authorize(&principal(&loaded, "bob"), Operation::Write, &id),
        Decision::Deny
    );
    assert_eq!(
        policy.authorize(&Principal::anonymous(), Operation::Read, &id),
        Decision::Allow
    );
}

#[test]
fn alice_cannot_write_elsewhere() {
    let loaded = load(TEAM_A);
    let id = resolve("team-b/lib/1.0").unwrap();
    assert_eq!(
        loaded
            .policy
            .authorize(&principal(&loaded, "alice"), Operation::Write, &id),
        Decision::Deny
    );
}

#[test]
fn disabled_authorization_always_allows() {
    let loaded = load(&TEAM_A.replace("enabled: true", "enabled: false"));
    let id = resolve("team-a/lib/1.0").unwrap();
    for p in [Principal::anonymous(), principal(&loaded, "bob")] {
        for op in [Operation::Read, Operation::Write] {
            assert_eq!(loaded.policy.authorize(&p, op, &id), Decision::Allow);
        }
    }
}

#[test]
fn claim_based_rules() {
    let loaded = load(
        r#"
enabled: true
principals:
  - {id: carol, token: c, claims: {role: release}}
  - {id: dave, token: d, claims: {role: dev}}
rules:
  - pattern: "releases"
    operation: write
    principal: {claims: {role: release}}
    effect: allow
  - pattern: "private"
    operation: read
    principal: anonymous
    effect: deny
"#,
    );
    let release = resolve("releases/app/2.0").unwrap();
    assert!(loaded
        .policy
        .authorize(&principal(&loaded, "carol"), Operation::Write, &release)
        .is_allowed());
    assert!(!loaded
        .policy
        .authorize(&principal(&loaded, "dave"), Operation::Write, &release)
        .is_allowed());

    let private = resolve("private/notes/1").unwrap();
    assert!(!loaded
        .policy
        .authorize(&Principal::anonymous(), Operation::Read, &private)
        .is_allowed());
    let stranger = Principal::authenticated("eve", BTreeMap::new());
    assert!(loaded
        .policy
        .authorize(&stranger, Operation::Read, &private)
        .is_allowed());
}
