//! The per-object deletion decision: annotations first, rules second.

use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use tracing::warn;

use sweep_core::{duration, expires, Decision, ANNOTATION_EXPIRES, ANNOTATION_TTL};
use sweep_rules::Engine;

/// Decide whether an object has outlived its declared lifetime.
///
/// Precedence: the `janitor/ttl` annotation, then `janitor/expires`, then
/// loaded rules. The first signal present yields the verdict, so an
/// unexpired annotation short-circuits everything below it. Malformed
/// annotations log a warning and keep the object.
pub fn decide(object: &Json, rules: Option<&Engine>, now: DateTime<Utc>) -> Decision {
    if let Some(raw) = annotation(object, ANNOTATION_TTL) {
        let ttl = match duration::parse(raw) {
            Ok(d) => d,
            Err(e) => {
                warn!(ttl = raw, error = %e, "invalid TTL annotation");
                return Decision::Keep;
            }
        };
        let age = age_of(object, now);
        if age > ttl {
            return Decision::Delete {
                reason: format!(
                    "TTL expired (age: {}, ttl: {})",
                    duration::format(age),
                    duration::format(ttl)
                ),
            };
        }
        return Decision::Keep;
    }

    if let Some(raw) = annotation(object, ANNOTATION_EXPIRES) {
        let expires_at = match expires::parse(raw) {
            Ok(t) => t,
            Err(e) => {
                warn!(expires = raw, error = %e, "invalid expiration annotation");
                return Decision::Keep;
            }
        };
        if now > expires_at {
            return Decision::Delete {
                reason: format!("Expiration time reached ({})", raw),
            };
        }
        return Decision::Keep;
    }

    if let Some(engine) = rules {
        if let Some((rule, ttl)) = engine.evaluate(object) {
            let age = age_of(object, now);
            if age > ttl {
                return Decision::Delete {
                    reason: format!(
                        "Rule '{}' matched (age: {}, ttl: {})",
                        rule.id,
                        duration::format(age),
                        duration::format(ttl)
                    ),
                };
            }
        }
    }

    Decision::Keep
}

fn annotation<'a>(object: &'a Json, key: &str) -> Option<&'a str> {
    object.pointer("/metadata/annotations")?.get(key)?.as_str()
}

/// Age measured from `creationTimestamp`. A missing or unparseable
/// timestamp counts as the Unix epoch: an annotated object without a
/// creation time is ancient, not immortal.
fn age_of(object: &Json, now: DateTime<Utc>) -> std::time::Duration {
    let created = object
        .pointer("/metadata/creationTimestamp")
        .and_then(Json::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    now.signed_duration_since(created)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use sweep_rules::Rule;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn ts(offset_hours: i64) -> String {
        (fixed_now() + chrono::Duration::hours(offset_hours)).to_rfc3339()
    }

    fn pod(annotations: Json, created: &str) -> Json {
        json!({
            "kind": "Pod",
            "metadata": {
                "name": "test-pod",
                "namespace": "default",
                "uid": "uid-1",
                "creationTimestamp": created,
                "annotations": annotations,
            },
        })
    }

    #[test]
    fn ttl_expired_deletes() {
        let obj = pod(json!({"janitor/ttl": "1h"}), &ts(-2));
        match decide(&obj, None, fixed_now()) {
            Decision::Delete { reason } => {
                assert!(reason.contains("TTL expired"), "{reason}");
                assert!(reason.contains("age: 2h"), "{reason}");
                assert!(reason.contains("ttl: 1h"), "{reason}");
            }
            Decision::Keep => panic!("expected delete"),
        }
    }

    #[test]
    fn ttl_not_expired_keeps() {
        let obj = pod(json!({"janitor/ttl": "2h"}), &ts(-1));
        assert_eq!(decide(&obj, None, fixed_now()), Decision::Keep);
    }

    #[test]
    fn ttl_boundary_is_strict() {
        // age == ttl exactly: keep.
        let obj = pod(json!({"janitor/ttl": "1h"}), &ts(-1));
        assert_eq!(decide(&obj, None, fixed_now()), Decision::Keep);
    }

    #[test]
    fn zero_ttl_with_any_age_deletes() {
        let obj = pod(json!({"janitor/ttl": "0s"}), &ts(-1));
        assert!(decide(&obj, None, fixed_now()).is_delete());
    }

    #[test]
    fn malformed_ttl_keeps() {
        let obj = pod(json!({"janitor/ttl": "invalid"}), &ts(-48));
        assert_eq!(decide(&obj, None, fixed_now()), Decision::Keep);
    }

    #[test]
    fn expires_reached_deletes() {
        let obj = pod(json!({"janitor/expires": "2024-12-31T23:59:59Z"}), &ts(-48));
        match decide(&obj, None, fixed_now()) {
            Decision::Delete { reason } => {
                assert!(reason.contains("Expiration time reached"), "{reason}");
                assert!(reason.contains("2024-12-31T23:59:59Z"), "{reason}");
            }
            Decision::Keep => panic!("expected delete"),
        }
    }

    #[test]
    fn expires_in_future_keeps() {
        let obj = pod(json!({"janitor/expires": "2025-06-01"}), &ts(-48));
        assert_eq!(decide(&obj, None, fixed_now()), Decision::Keep);
    }

    #[test]
    fn expires_boundary_is_strict() {
        // now == expires exactly: keep.
        let obj = pod(json!({"janitor/expires": "2025-01-01T12:00:00Z"}), &ts(-48));
        assert_eq!(decide(&obj, None, fixed_now()), Decision::Keep);
    }

    #[test]
    fn malformed_expires_keeps() {
        let obj = pod(json!({"janitor/expires": "not-a-date"}), &ts(-48));
        assert_eq!(decide(&obj, None, fixed_now()), Decision::Keep);
    }

    #[test]
    fn unexpired_ttl_shadows_expired_expires() {
        // Both annotations set: the TTL wins and the expired expires
        // annotation has no observable effect.
        let obj = pod(
            json!({"janitor/ttl": "48h", "janitor/expires": "2020-01-01"}),
            &ts(-1),
        );
        assert_eq!(decide(&obj, None, fixed_now()), Decision::Keep);
    }

    fn pr_rule_engine() -> Engine {
        Engine::from_rules(vec![Rule {
            id: "pr-dep".into(),
            resources: vec!["deployments".into()],
            expression: r#"object.metadata.name.startsWith("pr-")"#.into(),
            ttl: "4h".into(),
        }])
        .unwrap()
    }

    #[test]
    fn rule_match_past_ttl_deletes() {
        let obj = json!({
            "kind": "Deployment",
            "metadata": {"name": "pr-123", "namespace": "default", "creationTimestamp": ts(-8)},
        });
        let engine = pr_rule_engine();
        match decide(&obj, Some(&engine), fixed_now()) {
            Decision::Delete { reason } => {
                assert!(reason.contains("Rule 'pr-dep' matched"), "{reason}");
            }
            Decision::Keep => panic!("expected delete"),
        }
    }

    #[test]
    fn rule_match_within_ttl_keeps() {
        let obj = json!({
            "kind": "Deployment",
            "metadata": {"name": "pr-123", "namespace": "default", "creationTimestamp": ts(-2)},
        });
        let engine = pr_rule_engine();
        assert_eq!(decide(&obj, Some(&engine), fixed_now()), Decision::Keep);
    }

    #[test]
    fn rule_kind_mismatch_keeps() {
        let obj = json!({
            "kind": "Pod",
            "metadata": {"name": "pr-foo", "namespace": "default", "creationTimestamp": ts(-8)},
        });
        let engine = pr_rule_engine();
        assert_eq!(decide(&obj, Some(&engine), fixed_now()), Decision::Keep);
    }

    #[test]
    fn unexpired_annotation_short_circuits_rules() {
        // The rule alone would delete this object; the fresh TTL annotation
        // takes precedence and keeps it.
        let obj = json!({
            "kind": "Deployment",
            "metadata": {
                "name": "pr-123",
                "namespace": "default",
                "creationTimestamp": ts(-8),
                "annotations": {"janitor/ttl": "24h"},
            },
        });
        let engine = pr_rule_engine();
        assert_eq!(decide(&obj, Some(&engine), fixed_now()), Decision::Keep);
    }

    #[test]
    fn no_signals_keeps() {
        let obj = json!({"kind": "Pod", "metadata": {"name": "p", "creationTimestamp": ts(-9000)}});
        assert_eq!(decide(&obj, None, fixed_now()), Decision::Keep);
    }

    #[test]
    fn missing_creation_timestamp_counts_as_ancient() {
        let obj = json!({
            "kind": "Pod",
            "metadata": {"name": "p", "annotations": {"janitor/ttl": "1h"}},
        });
        assert!(decide(&obj, None, fixed_now()).is_delete());
    }
}
