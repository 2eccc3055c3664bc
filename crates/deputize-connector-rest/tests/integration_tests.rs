//! Integration tests for the REST adapters using wiremock.
//!
//! Covers the PagerDuty roster lookup, Gitlab group reconciliation with
//! pagination and protected members, and the Slack topic sink.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use deputize_connector_rest::{
    GitlabConfig, GitlabSink, PagerDutyConfig, PagerDutySource, SlackApi, SlackConfig,
    SlackNotifier,
};
use deputize_core::identity::{identity_set, roster_from};
use deputize_core::prelude::*;

// =============================================================================
// Test Helpers
// =============================================================================

const GROUP_MEMBERS: &str = "/api/v4/groups/ops%2Fapprovers/members";

fn pagerduty_config(server: &MockServer) -> PagerDutyConfig {
    PagerDutyConfig {
        schedules: vec!["Ops Primary".to_string()],
        base_url: server.uri(),
        token: Some("pd-key".to_string()),
        ..PagerDutyConfig::default()
    }
}

fn window() -> TimeWindow {
    TimeWindow::starting_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), Duration::seconds(1))
}

fn gitlab_sink(server: &MockServer) -> GitlabSink {
    GitlabSink::new(GitlabConfig::new(server.uri(), "ops/approvers").with_token("glpat-test")).unwrap()
}

fn slack_config(server: &MockServer) -> SlackConfig {
    SlackConfig {
        enabled: true,
        channels: vec!["C01OPS".to_string()],
        api_url: server.uri(),
        token: Some("xoxb-test".to_string()),
        ..SlackConfig::default()
    }
}

async fn mount_slack_user(server: &MockServer, email: &str, id: &str, name: &str) {
    Mock::given(method("GET"))
        .and(path("/users.lookupByEmail"))
        .and(query_param("email", email))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": true, "user": {"id": id, "name": name}})),
        )
        .mount(server)
        .await;
}

// =============================================================================
// PagerDuty Tests
// =============================================================================

#[tokio::test]
async fn test_pagerduty_roster_from_matching_schedule() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/schedules"))
        .and(query_param("query", "Ops Primary"))
        .and(header("Authorization", "Token token=pd-key"))
        .and(header("Accept", "application/vnd.pagerduty+json;version=2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schedules": [
                {"id": "PSCHED1", "name": "Ops Primary"},
                {"id": "PSCHED2", "name": "Ops Primary Shadow"}
            ],
            "more": false
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/schedules/PSCHED1/users"))
        .and(query_param("since", "2024-01-01T00:00:00Z"))
        .and(query_param("until", "2024-01-01T00:00:01Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [
                {"id": "PU1", "email": "Alice@Example.com"},
                {"id": "PU2", "email": "bob@example.com"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = PagerDutySource::new(&pagerduty_config(&server)).unwrap();
    let roster = source
        .fetch_roster(&["Ops Primary".to_string()], &window())
        .await
        .unwrap();

    assert_eq!(roster, roster_from(["alice@example.com", "bob@example.com"]));
}

#[tokio::test]
async fn test_pagerduty_oauth_uses_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/schedules"))
        .and(header("Authorization", "Bearer pd-oauth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schedules": [{"id": "PSCHED1", "name": "Ops Primary"}],
            "more": false
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/schedules/PSCHED1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"users": []})))
        .mount(&server)
        .await;

    let config = PagerDutyConfig {
        with_oauth: true,
        token: Some("pd-oauth".to_string()),
        ..pagerduty_config(&server)
    };
    let roster = PagerDutySource::new(&config)
        .unwrap()
        .fetch_roster(&config.schedules, &window())
        .await
        .unwrap();

    assert!(roster.is_empty());
}

#[tokio::test]
async fn test_pagerduty_schedule_lookup_paginates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/schedules"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schedules": [{"id": "POTHER", "name": "Ops Primary Old"}],
            "more": true
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/schedules"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schedules": [{"id": "PSCHED9", "name": "Ops Primary"}],
            "more": false
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/schedules/PSCHED9/users"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"users": [{"email": "carol@example.com"}]})),
        )
        .mount(&server)
        .await;

    let config = pagerduty_config(&server);
    let roster = PagerDutySource::new(&config)
        .unwrap()
        .fetch_roster(&config.schedules, &window())
        .await
        .unwrap();

    assert_eq!(roster, roster_from(["carol@example.com"]));
}

#[tokio::test]
async fn test_pagerduty_unknown_schedule_is_roster_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"schedules": [], "more": false})))
        .mount(&server)
        .await;

    let config = pagerduty_config(&server);
    let err = PagerDutySource::new(&config)
        .unwrap()
        .fetch_roster(&config.schedules, &window())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::RosterUnavailable { .. }));
    assert!(err.to_string().contains("Ops Primary"));
}

#[tokio::test]
async fn test_pagerduty_auth_failure_is_roster_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/schedules"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "Unauthorized", "code": 2006}})),
        )
        .mount(&server)
        .await;

    let config = pagerduty_config(&server);
    let err = PagerDutySource::new(&config)
        .unwrap()
        .fetch_roster(&config.schedules, &window())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::RosterUnavailable { .. }));
}

// =============================================================================
// Gitlab Tests
// =============================================================================

#[tokio::test]
async fn test_gitlab_lookup_returns_every_candidate() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/users"))
        .and(query_param("search", "dave@example.com"))
        .and(header("PRIVATE-TOKEN", "glpat-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 4, "username": "dave"},
            {"id": 5, "username": "dave.admin"}
        ])))
        .mount(&server)
        .await;

    let sink = gitlab_sink(&server);
    let found = sink.lookup(&RosterEntry::new("dave@example.com")).await.unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].describe(), "dave (4)");
}

#[tokio::test]
async fn test_gitlab_snapshot_follows_pages_and_marks_protected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(GROUP_MEMBERS))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "2")
                .set_body_json(json!([
                    {"id": 1, "username": "alice", "access_level": 30},
                    {"id": 9, "username": "owner", "access_level": 50}
                ])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(GROUP_MEMBERS))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "")
                .set_body_json(json!([{"id": 2, "username": "mallory", "access_level": 30}])),
        )
        .mount(&server)
        .await;

    let snapshot = gitlab_sink(&server).read_snapshot().await.unwrap();

    assert_eq!(snapshot.members, identity_set(["1", "2", "9"]));
    assert_eq!(snapshot.protected, identity_set(["9"]));
    assert_eq!(snapshot.handle.target, "ops/approvers");
}

#[tokio::test]
async fn test_gitlab_reconcile_swaps_members_and_keeps_protected() {
    let server = MockServer::start().await;

    for (email, id, username) in [("alice@example.com", 1, "alice"), ("bob@example.com", 3, "bob")] {
        Mock::given(method("GET"))
            .and(path("/api/v4/users"))
            .and(query_param("search", email))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": id, "username": username}])))
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path(GROUP_MEMBERS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "username": "alice", "access_level": 30},
            {"id": 2, "username": "mallory", "access_level": 30},
            {"id": 9, "username": "owner", "access_level": 50}
        ])))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(format!("{GROUP_MEMBERS}/2")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(GROUP_MEMBERS))
        .and(body_json(json!({"user_id": 3, "access_level": 30})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let roster = roster_from(["alice@example.com", "bob@example.com"]);
    let report = Reconciler::new(ReconcilerConfig::default())
        .reconcile(&roster, &[ReconcileTarget::new(Arc::new(gitlab_sink(&server)))])
        .await;

    assert!(report.is_success());
    let sink = report.sink("gitlab").unwrap();
    assert_eq!(sink.outcome, SinkOutcome::Changed);
    assert_eq!(sink.added(), identity_set(["3"]));
    assert_eq!(sink.removed(), identity_set(["2"]));
}

#[tokio::test]
async fn test_gitlab_existing_member_conflict_is_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GROUP_MEMBERS))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "Member already exists"})))
        .mount(&server)
        .await;

    let sink = gitlab_sink(&server);
    let handle = SinkHandle::new("ops/approvers");
    sink.add_member(&handle, &ResolvedIdentity::new("3")).await.unwrap();
}

#[tokio::test]
async fn test_gitlab_forbidden_add_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GROUP_MEMBERS))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "403 Forbidden"})))
        .mount(&server)
        .await;

    let sink = gitlab_sink(&server);
    let err = sink
        .add_member(&SinkHandle::new("ops/approvers"), &ResolvedIdentity::new("3"))
        .await
        .unwrap_err();

    assert!(matches!(err, SinkError::AuthorizationFailed { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_gitlab_server_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(GROUP_MEMBERS))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let err = gitlab_sink(&server).read_snapshot().await.unwrap_err();
    assert!(err.is_transient());
}

// =============================================================================
// Slack Tests
// =============================================================================

#[tokio::test]
async fn test_slack_unknown_email_resolves_to_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users.lookupByEmail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "users_not_found"})))
        .mount(&server)
        .await;

    let sinks = slack_config(&server).sinks().unwrap();
    let found = sinks[0].lookup(&RosterEntry::new("ghost@example.com")).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_slack_missing_channel_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/conversations.info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "channel_not_found"})))
        .mount(&server)
        .await;

    let sinks = slack_config(&server).sinks().unwrap();
    let err = sinks[0].read_snapshot().await.unwrap_err();
    assert!(matches!(err, SinkError::NotFound { .. }));
}

#[tokio::test]
async fn test_slack_reconcile_rewrites_topic_and_keeps_suffix() {
    let server = MockServer::start().await;

    mount_slack_user(&server, "alice@example.com", "U1", "alice").await;
    mount_slack_user(&server, "carol@example.com", "U3", "carol").await;

    Mock::given(method("GET"))
        .and(path("/conversations.info"))
        .and(query_param("channel", "C01OPS"))
        .and(header("Authorization", "Bearer xoxb-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": {"id": "C01OPS", "topic": {"value": "On-Call: <@U1>, <@U2> |runbook: https://wiki/ops"}}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/conversations.setTopic"))
        .and(body_json(json!({
            "channel": "C01OPS",
            "topic": "On-Call: <@U1>, <@U3> |runbook: https://wiki/ops"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let sinks = slack_config(&server).sinks().unwrap();
    let targets: Vec<ReconcileTarget> = sinks
        .into_iter()
        .map(|s| ReconcileTarget::new(Arc::new(s)))
        .collect();

    let roster = roster_from(["alice@example.com", "carol@example.com"]);
    let report = Reconciler::new(ReconcilerConfig::default())
        .reconcile(&roster, &targets)
        .await;

    let sink = report.sink("slack:C01OPS").unwrap();
    assert!(sink.is_success());
    assert_eq!(sink.added(), identity_set(["U3"]));
    assert_eq!(sink.removed(), identity_set(["U2"]));
}

#[tokio::test]
async fn test_slack_topic_already_current_is_unchanged() {
    let server = MockServer::start().await;

    mount_slack_user(&server, "alice@example.com", "U1", "alice").await;

    Mock::given(method("GET"))
        .and(path("/conversations.info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": {"id": "C01OPS", "topic": {"value": "On-Call: <@U1> |"}}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/conversations.setTopic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(0)
        .mount(&server)
        .await;

    let sinks = slack_config(&server).sinks().unwrap();
    let targets: Vec<ReconcileTarget> = sinks
        .into_iter()
        .map(|s| ReconcileTarget::new(Arc::new(s)))
        .collect();

    let report = Reconciler::new(ReconcilerConfig::default())
        .reconcile(&roster_from(["alice@example.com"]), &targets)
        .await;

    assert_eq!(report.sinks[0].outcome, SinkOutcome::Unchanged);
}

#[tokio::test]
async fn test_slack_set_topic_failure_fails_sink() {
    let server = MockServer::start().await;

    mount_slack_user(&server, "alice@example.com", "U1", "alice").await;

    Mock::given(method("GET"))
        .and(path("/conversations.info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": {"id": "C01OPS", "topic": {"value": ""}}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/conversations.setTopic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "not_in_channel"})))
        .mount(&server)
        .await;

    let sinks = slack_config(&server).sinks().unwrap();
    let targets: Vec<ReconcileTarget> = sinks
        .into_iter()
        .map(|s| ReconcileTarget::new(Arc::new(s)))
        .collect();

    let report = Reconciler::new(ReconcilerConfig::default())
        .reconcile(&roster_from(["alice@example.com"]), &targets)
        .await;

    assert!(!report.is_success());
    assert_eq!(report.sinks[0].outcome, SinkOutcome::Failed);
}

async fn reconcile_posting_slack(server: &MockServer, set_topic_ok: bool) -> ReconciliationReport {
    mount_slack_user(server, "alice@example.com", "U1", "alice").await;

    Mock::given(method("GET"))
        .and(path("/conversations.info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": {"id": "C01OPS", "topic": {"value": "On-Call: <@U2> |"}}
        })))
        .mount(server)
        .await;

    let body = if set_topic_ok {
        json!({"ok": true})
    } else {
        json!({"ok": false, "error": "not_in_channel"})
    };
    Mock::given(method("POST"))
        .and(path("/conversations.setTopic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;

    let config = SlackConfig {
        post_message: true,
        ..slack_config(server)
    };
    let targets: Vec<ReconcileTarget> = config
        .sinks()
        .unwrap()
        .into_iter()
        .map(|s| ReconcileTarget::new(Arc::new(s)))
        .collect();

    Reconciler::new(ReconcilerConfig::default())
        .reconcile(&roster_from(["alice@example.com"]), &targets)
        .await
}

#[tokio::test]
async fn test_slack_posts_oncall_message_after_topic_update() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .and(body_json(json!({"channel": "C01OPS", "text": "On-Call: <@U1>"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let report = reconcile_posting_slack(&server, true).await;

    assert!(report.is_success());
    assert_eq!(report.sinks[0].added(), identity_set(["U1"]));
}

#[tokio::test]
async fn test_slack_skips_oncall_message_when_topic_update_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(0)
        .mount(&server)
        .await;

    let report = reconcile_posting_slack(&server, false).await;

    assert_eq!(report.sinks[0].outcome, SinkOutcome::Failed);
    assert!(report.sinks[0].added().is_empty());
}

#[tokio::test]
async fn test_slack_notifier_posts_change_to_every_channel() {
    let server = MockServer::start().await;

    let change = MembershipChange {
        sink: "gitlab".to_string(),
        kind: SinkKind::Gitlab,
        target: "ops/approvers".to_string(),
        before: identity_set(["1"]),
        after: identity_set(["3"]),
    };

    for channel in ["C01OPS", "C02SRE"] {
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_json(json!({"channel": channel, "text": change.describe()})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let api = SlackApi::new(&server.uri(), "xoxb-test", std::time::Duration::from_secs(5)).unwrap();
    let notifier = SlackNotifier::new(api, vec!["C01OPS".to_string(), "C02SRE".to_string()]);

    notifier.notify(&change).await.unwrap();
}
