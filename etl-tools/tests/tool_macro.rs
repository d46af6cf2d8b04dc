use etl_tools::{ConcurrencyKind, ToolError, ToolRegistry, tool};
use serde_json::{Value, json};

#[tool(name = "hello_tool", description = "returns hello")]
fn hello(name: String) -> String {
    format!("hello {name}")
}

/// Adds two integers.
///
/// Extra detail that should not end up in the description.
#[tool]
fn add(a: i64, b: i64) -> i64 {
    a + b
}

#[tool(name = "async_add")]
async fn async_add(a: i64, b: i64) -> i64 {
    tokio::task::yield_now().await;
    a + b
}

#[tool]
fn divide(numerator: f64, denominator: f64) -> Result<f64, ToolError> {
    if denominator == 0.0 {
        return Err(ToolError::execution("division by zero"));
    }
    Ok(numerator / denominator)
}

#[tool]
fn greet(name: String, greeting: Option<String>) -> String {
    format!("{} {name}", greeting.as_deref().unwrap_or("hi"))
}

#[tool]
fn ping() -> &'static str {
    "pong"
}

fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for record in [
        hello_tool(),
        add_tool(),
        async_add_tool(),
        divide_tool(),
        greet_tool(),
        ping_tool(),
    ] {
        registry.register(record);
    }
    registry
}

#[test]
fn explicit_name_and_description_are_used() {
    let registry = registry();
    let record = registry.lookup("hello_tool").expect("registered under explicit name");

    assert_eq!(record.description(), Some("returns hello"));
    assert!(registry.lookup("hello").is_none());
    assert_eq!(registry.call("hello_tool", json!(["world"])).unwrap(), json!("hello world"));
}

#[test]
fn bare_attribute_uses_function_name_and_doc_summary() {
    let registry = registry();
    let record = registry.lookup("add").expect("registered under fn name");

    assert_eq!(record.description(), Some("Adds two integers."));
    assert_eq!(record.concurrency_kind(), ConcurrencyKind::Immediate);
    assert_eq!(registry.call("add", json!({ "a": 2, "b": 3 })).unwrap(), json!(5));
}

#[test]
fn wrapped_function_is_still_callable_directly() {
    assert_eq!(add(2, 3), 5);
    assert_eq!(hello("there".into()), "hello there");
}

#[tokio::test]
async fn async_functions_become_deferred_tools() {
    let registry = registry();
    let record = registry.lookup("async_add").unwrap();

    assert_eq!(record.concurrency_kind(), ConcurrencyKind::Deferred);
    assert_eq!(registry.call_async("async_add", json!([2, 3])).await.unwrap(), json!(5));
}

#[test]
fn async_tool_can_be_called_from_blocking_code() {
    let registry = registry();
    assert_eq!(registry.call("async_add", json!([40, 2])).unwrap(), json!(42));
}

#[test]
fn fallible_tools_propagate_their_error() {
    let registry = registry();

    assert_eq!(registry.call("divide", json!([9.0, 3.0])).unwrap(), json!(3.0));
    let err = registry.call("divide", json!([1.0, 0.0])).unwrap_err();
    assert!(matches!(err, ToolError::Execution { reason } if reason == "division by zero"));
}

#[test]
fn optional_parameters_may_be_omitted() {
    let registry = registry();

    assert_eq!(registry.call("greet", json!(["ada"])).unwrap(), json!("hi ada"));
    assert_eq!(
        registry.call("greet", json!({ "name": "ada", "greeting": "hello" })).unwrap(),
        json!("hello ada")
    );
}

#[test]
fn zero_argument_tools_ignore_input() {
    let registry = registry();
    assert_eq!(registry.call("ping", Value::Null).unwrap(), json!("pong"));
}

#[test]
fn malformed_input_is_rejected_before_the_call() {
    let registry = registry();
    let err = registry.call("add", json!({ "a": "two" })).unwrap_err();
    assert!(matches!(err, ToolError::InvalidInput { tool, .. } if tool == "add"));
}
