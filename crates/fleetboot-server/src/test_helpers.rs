//! Test helpers for fleetboot-server
//!
//! Builds an `AppState` over in-memory fakes: controllers that record what
//! they were asked to do, a network that always succeeds and a prober for
//! which every node is already back.

use crate::AppState;
use async_trait::async_trait;
use fleetboot_bmc::{EscalationLevel, NodeController, NodeOperation, PowerState};
use fleetboot_common::{FleetView, MemoryFleet, MemoryRights, Node, NodePattern, NodeState, Operation};
use fleetboot_ipxe::{BootProfile, PxeSwitcher};
use fleetboot_macrostep::{KeyDistributor, MacrostepExecutor, StepPrimitives, VlanSwitcher, WaitPolicy};
use fleetboot_probe::{ProbeOutcome, Reachability};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Calls made against the fakes, in order
pub type Journal = Arc<Mutex<Vec<String>>>;

pub const TEST_NODES: [&str; 3] = ["node-1", "node-2", "node-3"];

struct RecordingController {
    name: String,
    journal: Journal,
}

impl RecordingController {
    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl NodeController for RecordingController {
    fn node(&self) -> &str {
        &self.name
    }

    async fn power_on(&self, level: EscalationLevel) -> fleetboot_bmc::Result<()> {
        self.record(format!("power_on:{}:{}", self.name, level));
        Ok(())
    }

    async fn power_off(&self, level: EscalationLevel) -> fleetboot_bmc::Result<()> {
        self.record(format!("power_off:{}:{}", self.name, level));
        Ok(())
    }

    async fn power_status(&self) -> fleetboot_bmc::Result<PowerState> {
        Ok(PowerState::On)
    }

    async fn reboot(&self, level: EscalationLevel) -> fleetboot_bmc::Result<()> {
        self.record(format!("reboot:{}:{}", self.name, level));
        Ok(())
    }

    fn console_command(&self) -> Option<String> {
        None
    }

    fn supports_operation(&self, _op: NodeOperation) -> bool {
        true
    }
}

struct NoopNetwork;

#[async_trait]
impl PxeSwitcher for NoopNetwork {
    async fn switch(&self, _node: &str, _profile: &BootProfile) -> fleetboot_ipxe::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl VlanSwitcher for NoopNetwork {
    async fn set_vlan(&self, _node: &Node) -> fleetboot_macrostep::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl KeyDistributor for NoopNetwork {
    async fn deliver_direct(&self, _node: &Node) -> fleetboot_macrostep::Result<()> {
        Ok(())
    }

    async fn deliver_tree(&self, _nodes: &[Node]) -> fleetboot_macrostep::Result<()> {
        Ok(())
    }
}

struct AcceptAll;

#[async_trait]
impl Reachability for AcceptAll {
    async fn probe(&self, _host: &str, _port: u16, _timeout: Duration) -> ProbeOutcome {
        ProbeOutcome::Open
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(10)
    }
}

/// AppState over [`TEST_NODES`], plus the journal of controller calls
///
/// `node-1` starts in `production`; the others have no recorded state.
/// `alice` may do anything, `bob` may only run power operations.
pub async fn create_test_app_state_with_journal() -> (AppState, Journal) {
    let journal: Journal = Arc::default();
    let fleet = MemoryFleet::new(TEST_NODES.iter().map(|name| {
        Node::new(
            *name,
            Arc::new(RecordingController {
                name: name.to_string(),
                journal: journal.clone(),
            }),
        )
    }));
    fleet
        .set_state("node-1", NodeState::Production)
        .await
        .expect("Failed to seed node state");

    let network = Arc::new(NoopNetwork);
    let primitives = StepPrimitives::new(network.clone(), network.clone(), network, Arc::new(AcceptAll))
        .with_wait_policy(
            WaitPolicy::default()
                .with_timeout(Duration::from_secs(2))
                .with_poll_interval(Duration::from_millis(10)),
        );
    let rights = MemoryRights::new()
        .grant("alice", Operation::Any, NodePattern::all())
        .grant("bob", Operation::Power, NodePattern::all());

    let state = AppState::new(
        Arc::new(fleet),
        Arc::new(rights),
        Arc::new(MacrostepExecutor::new(primitives)),
    );
    (state, journal)
}

/// Create a minimal AppState for testing
pub async fn create_test_app_state() -> AppState {
    create_test_app_state_with_journal().await.0
}

/// Create a test router with API routes
pub async fn create_test_router() -> axum::Router {
    crate::api::router().with_state(create_test_app_state().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{router, USER_HEADER};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, user: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(USER_HEADER, user)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn state_of(state: &AppState, node: &str) -> Option<NodeState> {
        state.fleet.get_states(&[node.to_string()]).await.unwrap()[node]
    }

    #[tokio::test]
    async fn test_create_test_app_state() {
        let state = create_test_app_state().await;
        assert_eq!(state.fleet.hostnames(), vec!["node-1", "node-2", "node-3"]);
    }

    #[tokio::test]
    async fn test_denied_reboot_touches_nothing() {
        let (state, journal) = create_test_app_state_with_journal().await;
        let app = router().with_state(state.clone());

        let (status, body) = send(
            app,
            post_json(
                "/reboot",
                "bob",
                json!({"nodes": ["node-1", "node-2"], "kind": "deploy_env"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "INVALID_RIGHTS");
        assert!(journal.lock().unwrap().is_empty());
        assert_eq!(state_of(&state, "node-1").await, Some(NodeState::Production));
    }

    #[tokio::test]
    async fn test_reboot_deploy_env() {
        let (state, journal) = create_test_app_state_with_journal().await;
        let app = router().with_state(state.clone());

        let (status, body) = send(
            app,
            post_json(
                "/reboot",
                "alice",
                json!({"nodes": ["node-1", "node-2"], "kind": "deploy_env", "level": 1}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["macrostep"], "reboot_deploy_env");
        assert_eq!(body["level"], 1);
        assert_eq!(body["verdicts"]["node-1"]["outcome"], "success");
        assert_eq!(body["verdicts"]["node-2"]["state"], "deploy-env");
        assert_eq!(state_of(&state, "node-1").await, Some(NodeState::DeployEnv));

        let mut calls = journal.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec!["reboot:node-1:hard", "reboot:node-2:hard"]);
    }

    #[tokio::test]
    async fn test_reboot_unknown_node_verdict() {
        let app = create_test_router().await;

        let (status, body) = send(
            app,
            post_json("/reboot", "alice", json!({"nodes": ["node-3", "ghost"]})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["macrostep"], "reboot_simple");
        assert_eq!(body["verdicts"]["node-3"]["outcome"], "success");
        assert_eq!(body["verdicts"]["ghost"]["outcome"], "failed");
        assert_eq!(body["verdicts"]["ghost"]["step"], Value::Null);
    }

    #[tokio::test]
    async fn test_power_status_reports_observed_state() {
        let (state, journal) = create_test_app_state_with_journal().await;
        let app = router().with_state(state.clone());

        let (status, body) = send(
            app,
            post_json("/power", "bob", json!({"nodes": ["node-1"], "mode": "status"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["macrostep"], "power_status");
        assert_eq!(body["verdicts"]["node-1"]["outcome"], "success");
        assert_eq!(body["verdicts"]["node-1"]["power"], "on");
        assert!(journal.lock().unwrap().is_empty());
        assert_eq!(state_of(&state, "node-1").await, Some(NodeState::Production));
    }

    #[tokio::test]
    async fn test_set_pxe_without_profile_is_rejected() {
        let app = create_test_router().await;

        let (status, body) = send(
            app,
            post_json("/reboot", "alice", json!({"nodes": ["node-1"], "kind": "set_pxe"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_invalid_level_is_rejected() {
        let (state, journal) = create_test_app_state_with_journal().await;
        let app = router().with_state(state);

        let (status, body) = send(
            app,
            post_json("/power", "alice", json!({"nodes": ["node-1"], "mode": "on", "level": 3})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_REQUEST");
        assert!(journal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let app = create_test_router().await;

        let (status, _) = send(app, post_json("/reboot", "alice", json!({"nodes": []}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_user_header() {
        let app = create_test_router().await;

        let (status, body) = send(app, get("/nodes", None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_nodes_fill_missing_with_null() {
        let app = create_test_router().await;

        let (status, body) = send(app, get("/nodes?nodes=node-1,ghost", Some("alice"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"node-1": "production", "ghost": null}));
    }

    #[tokio::test]
    async fn test_nodes_default_to_whole_inventory() {
        let app = create_test_router().await;

        let (status, body) = send(app, get("/nodes", Some("alice"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"node-1": "production", "node-2": null, "node-3": null})
        );
    }

    #[tokio::test]
    async fn test_nodes_need_right() {
        let app = create_test_router().await;

        let (status, body) = send(app, get("/nodes?nodes=node-1", Some("bob"))).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "INVALID_RIGHTS");
    }

    #[tokio::test]
    async fn test_rights_lists_grants() {
        let app = create_test_router().await;

        let (status, body) = send(app, get("/rights", Some("bob"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"], "bob");
        assert_eq!(body["grants"], json!([{"operation": "power", "nodes": "*"}]));
    }

    #[tokio::test]
    async fn test_unserved_kinds() {
        let app = create_test_router().await;
        let (status, body) = send(app, get("/stats/today", Some("alice"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_SERVED");

        let app = create_test_router().await;
        let (status, body) = send(app, get("/unicorns", Some("alice"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }
}
