//! Task router tests against a counting invoker stub.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use petstore_agent::{PetstoreClient, TaskRouter};
use petstore_core::{ErrorDescriptor, InvocationResult};
use petstore_mcp::{Caching, Invoker, RetryPolicy, Retrying, TransportError};
use serde_json::{json, Map, Value};

/// Stands in for the transport: counts calls and records their arguments.
#[derive(Default)]
struct StubTransport {
    calls: AtomicUsize,
    log: Mutex<Vec<(String, Value)>>,
}

impl StubTransport {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invoker for StubTransport {
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<InvocationResult, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().push((tool.to_string(), arguments.clone()));

        let result = match tool {
            "find_pets_by_status" => InvocationResult::success(
                json!([
                    {"id": 1, "name": "Rex", "photoUrls": [], "status": "available"},
                    {"id": 2, "name": "Tom", "photoUrls": [], "status": "available"}
                ]),
                "Pets found",
            ),
            "get_inventory" => InvocationResult::success(json!({"available": 2, "sold": 0}), "Inventory"),
            "get_pet_by_id" if arguments["pet_id"] == 404 => InvocationResult::failure(
                ErrorDescriptor::new("tool_error", "Error getting pet: HTTP 404"),
                "Error getting pet: HTTP 404",
            ),
            _ => InvocationResult::success(json!({"tool": tool, "call": n}), format!("{} done", tool)),
        };
        Ok(result)
    }
}

fn kwargs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("kwargs must be an object"),
    }
}

fn router() -> (TaskRouter, Arc<StubTransport>) {
    let stub = Arc::new(StubTransport::default());
    let router = TaskRouter::with_defaults(PetstoreClient::new(Arc::clone(&stub)));
    (router, stub)
}

#[tokio::test]
async fn test_find_pets_end_to_end() {
    let (router, stub) = router();

    let response = router
        .execute("find_pets", kwargs(json!({"status": "available"})))
        .await;

    assert!(response.success);
    assert_eq!(response.task, "find_pets");
    let records = response.result.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "Rex");
    assert_eq!(records[1]["name"], "Tom");

    let log = stub.log.lock();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0], ("find_pets_by_status".to_string(), json!({"status": "available"})));
}

#[tokio::test]
async fn test_invalid_pet_never_reaches_transport() {
    let (router, stub) = router();

    let response = router
        .execute(
            "manage_pet",
            kwargs(json!({"action": "add", "name": "", "photoUrls": []})),
        )
        .await;

    assert!(!response.success);
    assert_eq!(response.action.as_deref(), Some("add"));
    let error = response.error.unwrap();
    assert_eq!(error.code, "validation_error");
    assert_eq!(error.detail.unwrap()["field"], "name");
    assert_eq!(stub.calls(), 0);

    let err = router
        .run("manage_pet", &kwargs(json!({"action": "add", "name": "", "photoUrls": []})))
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("name"));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn test_unknown_task_and_action_are_reported() {
    let (router, stub) = router();

    let response = router.execute("adopt_pet", Map::new()).await;
    assert!(!response.success);
    assert_eq!(response.error.unwrap().code, "unknown_task");

    let response = router
        .execute("process_order", kwargs(json!({"action": "refund", "id": 1})))
        .await;
    assert!(!response.success);
    let error = response.error.unwrap();
    assert_eq!(error.code, "unknown_action");
    assert_eq!(error.detail.unwrap()["action"], "refund");

    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn test_each_action_dispatches_one_tool() {
    let (router, stub) = router();

    let cases = [
        ("manage_pet", json!({"action": "delete", "id": 3}), "delete_pet"),
        ("manage_pet", json!({"action": "get", "pet_id": 3}), "get_pet_by_id"),
        ("process_order", json!({"action": "place", "petId": 3}), "place_order"),
        ("process_order", json!({"action": "get", "order_id": 5}), "get_order_by_id"),
        ("process_order", json!({"action": "cancel", "id": 5}), "delete_order"),
        ("manage_user", json!({"action": "login", "username": "jdoe", "password": "pw"}), "login_user"),
        ("manage_user", json!({"action": "logout"}), "logout_user"),
        ("manage_user", json!({"action": "get", "username": "jdoe"}), "get_user_by_name"),
        ("manage_user", json!({"action": "delete", "username": "jdoe"}), "delete_user"),
    ];

    for (i, (task, args, tool)) in cases.into_iter().enumerate() {
        let response = router.execute(task, kwargs(args)).await;
        assert!(response.success, "{} failed: {}", task, response.message);
        assert_eq!(stub.log.lock()[i].0, tool);
    }
    assert_eq!(stub.calls(), 9);
}

#[tokio::test]
async fn test_tool_failure_becomes_unsuccessful_response() {
    let (router, _stub) = router();

    let response = router
        .execute("manage_pet", kwargs(json!({"action": "get", "id": 404})))
        .await;
    assert!(!response.success);
    assert_eq!(response.message, "Error getting pet: HTTP 404");
    assert_eq!(response.error.unwrap().code, "tool_error");
}

#[tokio::test(start_paused = true)]
async fn test_reads_are_cached_and_writes_are_not() {
    let stub = Arc::new(StubTransport::default());
    let stack = Retrying::new(
        Caching::new(Arc::clone(&stub), Duration::from_secs(300), 100),
        RetryPolicy::new(3, Duration::from_secs(1)),
    );
    let router = TaskRouter::with_defaults(PetstoreClient::new(stack));

    let get = || kwargs(json!({"action": "get", "id": 7}));
    let first = router.execute("manage_pet", get()).await;
    let second = router.execute("manage_pet", get()).await;
    assert_eq!(stub.calls(), 1);
    assert_eq!(first.result, second.result);

    tokio::time::advance(Duration::from_secs(301)).await;
    router.execute("manage_pet", get()).await;
    assert_eq!(stub.calls(), 2);

    let add = || kwargs(json!({"action": "add", "name": "Rex", "photoUrls": ["u"]}));
    for _ in 0..3 {
        assert!(router.execute("manage_pet", add()).await.success);
    }
    assert_eq!(stub.calls(), 5);
}

#[tokio::test]
async fn test_store_summary_task() {
    let (router, stub) = router();

    let response = router.execute("store_summary", Map::new()).await;
    assert!(response.success, "{}", response.message);
    assert_eq!(response.result["available_count"], 2);
    assert_eq!(stub.calls(), 4);
}

#[test]
fn test_prompt_and_sampling_access() {
    let (router, _stub) = router();

    let mut vars = HashMap::new();
    vars.insert("status".to_string(), json!("available"));
    vars.insert("tags".to_string(), json!(["friendly", "small"]));
    let prompt = router.get_prompt("pet_search", &vars).unwrap();
    assert!(prompt.user.contains("available"));
    assert!(prompt.user.contains("friendly, small"));

    vars.remove("tags");
    let err = router.get_prompt("pet_search", &vars).unwrap_err();
    assert_eq!(err.code(), "missing_placeholder");

    let creative = router.get_sampling_config("creative").unwrap();
    assert_eq!(creative.temperature, 0.7);
    assert_eq!(router.get_sampling_config("wild").unwrap_err().code(), "unknown_preset");

    vars.insert("tags".to_string(), json!("none"));
    let completion = router.prepare_completion("pet_search", "precise", &vars).unwrap();
    assert!(completion.system.contains("pet store assistant"));
    assert_eq!(completion.sampling.max_tokens, 800);
}
