//! Authorization engine integration tests
//!
//! Rule tables are loaded from TOML the way an application would, then
//! requests are checked end to end:
//! - Method-qualified rules and the implicit default deny
//! - Path variables (`/user/{user}`) in access expressions
//! - Case-insensitive patterns
//! - Role hierarchy expansion
//! - First-match-wins ordering
//! - Concurrent evaluation

use pathwarden::access_control::{
    AccessExpression, AccessResolver, AccessRule, Decision, GrantedAuthorities, PathPattern,
    RequestDescriptor, RequestMatcher, RoleHierarchy, RuleRegistry,
};
use pathwarden::config::load_config_from_str;
use rstest::rstest;
use std::sync::Arc;
use std::thread;

// =============================================================================
// Test Helpers
// =============================================================================

fn resolver(toml: &str) -> AccessResolver {
    let config = load_config_from_str(toml).unwrap();
    AccessResolver::from_config(&config).unwrap()
}

fn request(method: &str, path: &str) -> RequestDescriptor {
    RequestDescriptor::new(method, path)
}

fn authorities(list: &[&str]) -> GrantedAuthorities {
    list.iter().copied().collect()
}

fn decide(resolver: &AccessResolver, method: &str, path: &str, roles: &[&str]) -> Decision {
    resolver.authorize(&request(method, path), &authorities(roles))
}

// =============================================================================
// 1. Method-qualified rules
// =============================================================================

mod method_rules {
    use super::*;

    const POST_DENY_ALL: &str = r##"
[[rules]]
method = "POST"
access = "denyAll"
"##;

    #[test]
    fn test_post_deny_all_is_forbidden() {
        let resolver = resolver(POST_DENY_ALL);
        assert_eq!(decide(&resolver, "POST", "/", &["ROLE_USER"]), Decision::Deny);
    }

    #[rstest]
    #[case("GET", "/")]
    #[case("GET", "/x")]
    #[case("PUT", "/x")]
    #[case("DELETE", "/anything/at/all")]
    fn test_undeclared_method_falls_to_default_deny(#[case] method: &str, #[case] path: &str) {
        let resolver = resolver(POST_DENY_ALL);
        let outcome = resolver.evaluate(&request(method, path), &authorities(&["ROLE_ADMIN"]));
        assert_eq!(outcome.decision, Decision::Deny);
        assert_eq!(outcome.rule, None);
    }

    #[test]
    fn test_method_allowed_only_where_declared() {
        let resolver = resolver(
            r##"
[[rules]]
pattern = "/x"
method = "POST"
access = "permitAll"
"##,
        );
        assert_eq!(decide(&resolver, "POST", "/x", &[]), Decision::Allow);
        assert_eq!(decide(&resolver, "GET", "/x", &[]), Decision::Deny);
    }

    #[test]
    fn test_method_comparison_is_exact() {
        let resolver = resolver(
            r##"
[[rules]]
method = "post"
access = "permitAll"
"##,
        );
        // The configured name is normalized, the request method is not
        assert_eq!(decide(&resolver, "POST", "/", &[]), Decision::Allow);
        assert_eq!(decide(&resolver, "post", "/", &[]), Decision::Deny);
    }
}

// =============================================================================
// 2. Path variables
// =============================================================================

mod path_variables {
    use super::*;

    const USER_RULE: &str = r##"
[[rules]]
pattern = "/user/{user}"
access = "#user == 'user'"
"##;

    #[rstest]
    #[case("/user/user", Decision::Allow)]
    #[case("/user/deny", Decision::Deny)]
    #[case("/user/USER", Decision::Deny)]
    #[case("/user", Decision::Deny)]
    #[case("/user/user/extra", Decision::Deny)]
    fn test_variable_comparison(#[case] path: &str, #[case] expected: Decision) {
        let resolver = resolver(USER_RULE);
        assert_eq!(decide(&resolver, "GET", path, &[]), expected);
    }

    #[test]
    fn test_camel_case_variable_name() {
        let resolver = resolver(
            r##"
[[rules]]
pattern = "/user/{userName}"
access = "#userName == 'user'"
"##,
        );
        let outcome = resolver.evaluate(&request("GET", "/user/user"), &authorities(&[]));
        assert_eq!(outcome.decision, Decision::Allow);
        assert_eq!(outcome.variables.get("userName").map(String::as_str), Some("user"));
        assert!(!outcome.variables.contains_key("username"));
    }

    #[test]
    fn test_wrong_case_lookup_is_false() {
        let resolver = resolver(
            r##"
[[rules]]
pattern = "/user/{userName}"
access = "#username == 'user'"
"##,
        );
        assert_eq!(decide(&resolver, "GET", "/user/user", &[]), Decision::Deny);
    }

    #[test]
    fn test_not_equal_on_undefined_variable_is_false() {
        let resolver = resolver(
            r##"
[[rules]]
pattern = "/user/{user}"
access = "#other != 'x'"
"##,
        );
        assert_eq!(decide(&resolver, "GET", "/user/user", &[]), Decision::Deny);
    }

    #[test]
    fn test_variables_combined_with_roles() {
        let resolver = resolver(
            r##"
[[rules]]
pattern = "/user/{user}/**"
access = "#user == 'alice' or hasRole('ADMIN')"
"##,
        );
        assert_eq!(decide(&resolver, "GET", "/user/alice/settings", &[]), Decision::Allow);
        assert_eq!(decide(&resolver, "GET", "/user/bob/settings", &[]), Decision::Deny);
        assert_eq!(
            decide(&resolver, "GET", "/user/bob/settings", &["ROLE_ADMIN"]),
            Decision::Allow
        );
    }

    #[test]
    fn test_constrained_variable() {
        let resolver = resolver(
            r##"
[[rules]]
pattern = "/orders/{id:[0-9]+}"
access = "permitAll"
"##,
        );
        assert_eq!(decide(&resolver, "GET", "/orders/42", &[]), Decision::Allow);
        assert_eq!(decide(&resolver, "GET", "/orders/latest", &[]), Decision::Deny);
    }
}

// =============================================================================
// 3. Case-insensitive patterns
// =============================================================================

mod case_insensitive {
    use super::*;

    const INSENSITIVE_USER_RULE: &str = r##"
[[rules]]
pattern = "/user/{user}"
access = "#user == 'user'"
case_sensitive = false
"##;

    #[test]
    fn test_upper_case_literal_matches() {
        let resolver = resolver(INSENSITIVE_USER_RULE);
        let outcome = resolver.evaluate(&request("GET", "/USER/user"), &authorities(&[]));
        assert_eq!(outcome.decision, Decision::Allow);
        assert_eq!(outcome.variables.get("user").map(String::as_str), Some("user"));
    }

    #[test]
    fn test_captured_value_keeps_request_case() {
        let resolver = resolver(INSENSITIVE_USER_RULE);
        let outcome = resolver.evaluate(&request("GET", "/USER/USER"), &authorities(&[]));
        assert_eq!(outcome.variables.get("user").map(String::as_str), Some("USER"));
        // The comparison itself stays exact
        assert_eq!(outcome.decision, Decision::Deny);
    }

    #[rstest]
    #[case("/USER/user", Decision::Allow)]
    #[case("/user/user", Decision::Allow)]
    #[case("/USER/deny", Decision::Deny)]
    #[case("/USER/USER", Decision::Deny)]
    fn test_camel_case_variable_in_insensitive_pattern(
        #[case] path: &str,
        #[case] expected: Decision,
    ) {
        let resolver = resolver(
            r##"
[[rules]]
pattern = "/user/{userName}"
access = "#userName == 'user'"
case_sensitive = false
"##,
        );
        let outcome = resolver.evaluate(&request("GET", path), &authorities(&[]));
        assert_eq!(outcome.rule, Some(0));
        assert_eq!(outcome.decision, expected);
        assert!(outcome.variables.contains_key("userName"));
    }

    #[test]
    fn test_sensitive_pattern_rejects_other_case() {
        let resolver = resolver(
            r##"
[[rules]]
pattern = "/user/{user}"
access = "permitAll"
"##,
        );
        let outcome = resolver.evaluate(&request("GET", "/USER/user"), &authorities(&[]));
        assert_eq!(outcome.rule, None);
        assert_eq!(outcome.decision, Decision::Deny);
    }
}

// =============================================================================
// 4. Role hierarchy
// =============================================================================

mod role_hierarchy {
    use super::*;

    #[test]
    fn test_superior_role_inherits_subordinate() {
        let resolver = resolver(
            r##"
[role_hierarchy]
hierarchy = "ROLE_USER > ROLE_ADMIN"

[[rules]]
access = "hasRole('ADMIN')"
"##,
        );
        assert_eq!(decide(&resolver, "GET", "/", &["ROLE_USER"]), Decision::Allow);
        assert_eq!(decide(&resolver, "GET", "/", &["ROLE_GUEST"]), Decision::Deny);
    }

    #[test]
    fn test_subordinate_does_not_inherit_superior() {
        let resolver = resolver(
            r##"
[role_hierarchy]
hierarchy = "ROLE_ADMIN > ROLE_USER"

[[rules]]
access = "hasRole('ADMIN')"
"##,
        );
        assert_eq!(decide(&resolver, "GET", "/", &["ROLE_USER"]), Decision::Deny);
    }

    #[test]
    fn test_transitive_chain_and_edges() {
        let resolver = resolver(
            r##"
[role_hierarchy]
hierarchy = "ROLE_ADMIN > ROLE_STAFF; ROLE_STAFF > ROLE_USER"
edges = [["ROLE_OWNER", "ROLE_ADMIN"]]

[[rules]]
pattern = "/profile"
access = "hasRole('USER')"
"##,
        );
        for role in ["ROLE_OWNER", "ROLE_ADMIN", "ROLE_STAFF", "ROLE_USER"] {
            assert_eq!(
                decide(&resolver, "GET", "/profile", &[role]),
                Decision::Allow,
                "{role} should reach ROLE_USER"
            );
        }
    }

    #[test]
    fn test_authority_checks_ignore_unrelated_roles() {
        let resolver = resolver(
            r##"
[role_hierarchy]
hierarchy = "ROLE_ADMIN > ROLE_USER"

[[rules]]
access = "hasAuthority('SCOPE_read')"
"##,
        );
        assert_eq!(decide(&resolver, "GET", "/", &["ROLE_ADMIN"]), Decision::Deny);
        assert_eq!(decide(&resolver, "GET", "/", &["SCOPE_read"]), Decision::Allow);
    }

    #[test]
    fn test_cycle_rejected_at_load() {
        let config = load_config_from_str(
            r##"
[role_hierarchy]
hierarchy = "ROLE_A > ROLE_B > ROLE_C"
edges = [["ROLE_C", "ROLE_A"]]

[[rules]]
access = "permitAll"
"##,
        )
        .unwrap();
        assert!(AccessResolver::from_config(&config).is_err());
    }
}

// =============================================================================
// 5. Ordering and determinism
// =============================================================================

mod ordering {
    use super::*;

    const ORDERED: &str = r##"
[[rules]]
pattern = "/admin/**"
access = "hasRole('ADMIN')"

[[rules]]
pattern = "/admin/health"
access = "permitAll"

[[rules]]
pattern = "/static/*.css"
access = "permitAll"

[[rules]]
access = "hasRole('USER')"
"##;

    #[rstest]
    #[case("/admin/health", &[], Decision::Deny)]
    #[case("/admin/health", &["ROLE_ADMIN"], Decision::Allow)]
    #[case("/admin", &["ROLE_ADMIN"], Decision::Allow)]
    #[case("/static/site.css", &[], Decision::Allow)]
    #[case("/static/site.js", &[], Decision::Deny)]
    #[case("/static/site.js", &["ROLE_USER"], Decision::Allow)]
    #[case("/home", &["ROLE_USER"], Decision::Allow)]
    fn test_first_match_wins(
        #[case] path: &str,
        #[case] roles: &[&str],
        #[case] expected: Decision,
    ) {
        let resolver = resolver(ORDERED);
        assert_eq!(decide(&resolver, "GET", path, roles), expected);
    }

    #[test]
    fn test_idempotent() {
        let resolver = resolver(ORDERED);
        let req = request("GET", "/admin/users");
        let auth = authorities(&["ROLE_USER"]);

        let first = resolver.evaluate(&req, &auth);
        let second = resolver.evaluate(&req, &auth);
        assert_eq!(first, second);
        assert_eq!(first.rule, Some(0));
    }

    #[test]
    fn test_default_allow_when_configured() {
        let resolver = resolver(
            r##"
[engine]
default_decision = "allow"

[[rules]]
pattern = "/secret"
access = "denyAll"
"##,
        );
        assert_eq!(decide(&resolver, "GET", "/secret", &[]), Decision::Deny);
        assert_eq!(decide(&resolver, "GET", "/public", &[]), Decision::Allow);
    }

    #[test]
    fn test_host_scoped_rule() {
        let resolver = resolver(
            r##"
[[rules]]
host = "admin.example.com"
access = "hasRole('ADMIN')"

[[rules]]
access = "permitAll"
"##,
        );
        let admin_host = request("GET", "/").with_host("ADMIN.example.com:443");
        assert_eq!(resolver.authorize(&admin_host, &authorities(&[])), Decision::Deny);

        let other_host = request("GET", "/").with_host("www.example.com");
        assert_eq!(resolver.authorize(&other_host, &authorities(&[])), Decision::Allow);
    }
}

// =============================================================================
// 6. Programmatic construction
// =============================================================================

#[test]
fn test_registry_built_in_code() {
    let mut registry = RuleRegistry::new(Decision::Deny);
    registry
        .register(AccessRule::new(
            RequestMatcher::path(PathPattern::compile("/docs/**", true).unwrap()),
            None,
            AccessExpression::PermitAll,
        ))
        .register(AccessRule::any_request(AccessExpression::has_role("ADMIN")));

    let mut hierarchy = RoleHierarchy::new();
    hierarchy.add_edge("ROLE_ROOT", "ROLE_ADMIN").unwrap();

    let resolver = AccessResolver::new(registry, hierarchy);
    assert_eq!(decide(&resolver, "GET", "/docs/intro", &[]), Decision::Allow);
    assert_eq!(decide(&resolver, "GET", "/app", &["ROLE_ROOT"]), Decision::Allow);
    assert_eq!(decide(&resolver, "GET", "/app", &["ROLE_USER"]), Decision::Deny);
}

// =============================================================================
// 7. Concurrency
// =============================================================================

#[test]
fn test_concurrent_authorize() {
    let resolver = Arc::new(resolver(
        r##"
[role_hierarchy]
hierarchy = "ROLE_ADMIN > ROLE_USER"

[[rules]]
pattern = "/user/{user}"
access = "#user == 'user' or hasRole('ADMIN')"

[[rules]]
access = "hasRole('USER')"
"##,
    ));

    let cases: Vec<(&str, Vec<&str>)> = vec![
        ("/user/user", vec![]),
        ("/user/deny", vec![]),
        ("/user/deny", vec!["ROLE_ADMIN"]),
        ("/other", vec!["ROLE_USER"]),
        ("/other", vec![]),
    ];
    let expected: Vec<Decision> = cases
        .iter()
        .map(|(path, roles)| decide(&resolver, "GET", path, roles))
        .collect();
    assert_eq!(
        expected,
        vec![
            Decision::Allow,
            Decision::Deny,
            Decision::Allow,
            Decision::Allow,
            Decision::Deny
        ]
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let cases: Vec<(String, Vec<String>)> = cases
                .iter()
                .map(|(p, r)| (p.to_string(), r.iter().map(|s| s.to_string()).collect()))
                .collect();
            thread::spawn(move || {
                (0..200)
                    .flat_map(|_| cases.iter())
                    .map(|(path, roles)| {
                        let auth: GrantedAuthorities = roles.iter().cloned().collect();
                        resolver.authorize(&RequestDescriptor::new("GET", path.as_str()), &auth)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        let decisions = handle.join().unwrap();
        for chunk in decisions.chunks(expected.len()) {
            assert_eq!(chunk, expected.as_slice());
        }
    }
}
