use std::{env, path::PathBuf, time::Duration};

use anyhow::Result;
use rmcp::{
    model::{CallToolRequestParam, ClientInfo},
    serve_client,
    service::ServiceError,
    ServiceExt,
};
use serde_json::{json, Value};
use tokio::time::Instant;
use uuid::Uuid;

use xcbridge_mcp::server::{
    config::{AuthSection, ServerConfig, ServerSection, SimulatorConfig, XcodeConfig},
    runtime::XcBridgeServer,
};

#[tokio::test]
async fn build_tool_returns_artifact_metadata() -> Result<()> {
    enable_fast_timeout();
    let config = test_server_config(20);
    let server = build_server(config);
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        server.serve(server_transport).await?.waiting().await?;
        Result::<_, anyhow::Error>::Ok(())
    });
    let client = serve_client(ClientInfo::default(), client_transport).await?;

    let args = json!({
        "project_path": allowed_project_path().to_string_lossy(),
        "scheme": "SampleApp",
        "destination": "platform=iOS Simulator,name=iPhone 16",
        "env_overrides": {
            "MOCK_XCODEBUILD_BEHAVIOR": "success"
        }
    })
    .as_object()
    .expect("JSON object")
    .clone();

    let start = Instant::now();
    let call_result = client
        .call_tool(CallToolRequestParam {
            name: "build_project".into(),
            arguments: Some(args),
        })
        .await;

    let _ = client.cancel().await;
    let _ = server_task.await;

    let response = call_result.expect("build_project should return a success response");
    assert!(
        start.elapsed() < Duration::from_secs(30),
        "build tool must respond within 30 seconds (test environment)"
    );
    let payload = response
        .structured_content
        .expect("structured_content should exist");
    assert_eq!(
        payload.get("status").and_then(|v| v.as_str()),
        Some("succeeded")
    );
    assert!(payload
        .get("artifact_path")
        .and_then(|v| v.as_str())
        .is_some());
    assert!(payload
        .get("artifact_sha256")
        .and_then(|v| v.as_str())
        .is_some());
    assert!(payload.get("job_id").and_then(|v| v.as_str()).is_some());
    Ok(())
}

#[tokio::test]
async fn build_tool_times_out_when_process_exceeds_deadline() -> Result<()> {
    enable_fast_timeout();
    let config = test_server_config(1);
    let server = build_server(config);
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        server.serve(server_transport).await?.waiting().await?;
        Result::<_, anyhow::Error>::Ok(())
    });
    let client = serve_client(ClientInfo::default(), client_transport).await?;

    let args = json!({
        "project_path": allowed_project_path().to_string_lossy(),
        "scheme": "SampleApp",
        "destination": "platform=iOS Simulator,name=iPhone 16",
        "env_overrides": {
            "MOCK_XCODEBUILD_BEHAVIOR": "sleep"
        }
    })
    .as_object()
    .expect("JSON object")
    .clone();

    let call_result = client
        .call_tool(CallToolRequestParam {
            name: "build_project".into(),
            arguments: Some(args),
        })
        .await;

    let _ = client.cancel().await;
    let _ = server_task.await;

    let error = call_result.expect_err("should return an error on timeout");
    match error {
        ServiceError::McpError(inner) => {
            assert_error_metadata(&inner, "timeout", "compliant", true);
        }
        other => panic!("Unexpected error: {other:?}", other = other),
    }
    Ok(())
}

#[tokio::test]
async fn build_tool_rejects_path_outside_allowlist() -> Result<()> {
    enable_fast_timeout();
    let config = test_server_config(20);
    let server = build_server(config);
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        server.serve(server_transport).await?.waiting().await?;
        Result::<_, anyhow::Error>::Ok(())
    });
    let client = serve_client(ClientInfo::default(), client_transport).await?;

    let args = json!({
        "project_path": PathBuf::from("/tmp/disallowed-project").to_string_lossy(),
        "scheme": "SampleApp",
        "destination": "platform=iOS Simulator,name=iPhone 16"
    })
    .as_object()
    .expect("JSON object")
    .clone();

    let call_result = client
        .call_tool(CallToolRequestParam {
            name: "build_project".into(),
            arguments: Some(args),
        })
        .await;

    let _ = client.cancel().await;
    let _ = server_task.await;

    let error = call_result.expect_err("disallowed path should return an error");
    match error {
        ServiceError::McpError(inner) => {
            assert_error_metadata(&inner, "path_not_allowed", "violation", false);
        }
        other => panic!("Unexpected error: {other:?}", other = other),
    }
    Ok(())
}

#[tokio::test]
async fn run_tests_tool_reports_failure_excerpt() -> Result<()> {
    enable_fast_timeout();
    let config = test_server_config(20);
    let server = build_server(config);
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        server.serve(server_transport).await?.waiting().await?;
        Result::<_, anyhow::Error>::Ok(())
    });
    let client = serve_client(ClientInfo::default(), client_transport).await?;

    let args = json!({
        "project_path": allowed_project_path().to_string_lossy(),
        "scheme": "SampleApp",
        "destination": "platform=iOS Simulator,name=iPhone 16",
        "env_overrides": {
            "MOCK_XCODEBUILD_BEHAVIOR": "fail"
        }
    })
    .as_object()
    .expect("JSON object")
    .clone();

    let call_result = client
        .call_tool(CallToolRequestParam {
            name: "run_tests".into(),
            arguments: Some(args),
        })
        .await;

    let _ = client.cancel().await;
    let _ = server_task.await;

    let error = call_result.expect_err("failing tests should return an error");
    match error {
        ServiceError::McpError(inner) => {
            assert_error_metadata(&inner, "xcodebuild_failed", "compliant", true);
        }
        other => panic!("Unexpected error: {other:?}", other = other),
    }
    Ok(())
}

#[tokio::test]
async fn fetch_tool_returns_artifact_metadata() -> Result<()> {
    enable_fast_timeout();
    let config = test_server_config(20);
    let server = build_server(config);
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        server.serve(server_transport).await?.waiting().await?;
        Result::<_, anyhow::Error>::Ok(())
    });
    let client = serve_client(ClientInfo::default(), client_transport).await?;

    let args = json!({
        "project_path": allowed_project_path().to_string_lossy(),
        "scheme": "SampleApp",
        "destination": "platform=iOS Simulator,name=iPhone 16",
        "env_overrides": {
            "MOCK_XCODEBUILD_BEHAVIOR": "success"
        }
    })
    .as_object()
    .expect("JSON object")
    .clone();

    let build_response = client
        .call_tool(CallToolRequestParam {
            name: "build_project".into(),
            arguments: Some(args),
        })
        .await
        .expect("build_project should succeed");
    let build_payload = build_response
        .structured_content
        .expect("structured_content");
    let job_id = build_payload
        .get("job_id")
        .and_then(|v| v.as_str())
        .expect("job_id")
        .to_string();

    let fetch_args = json!({
        "job_id": job_id.clone(),
        "include_logs": true
    })
    .as_object()
    .expect("object")
    .clone();

    let fetch_response = client
        .call_tool(CallToolRequestParam {
            name: "fetch_build_output".into(),
            arguments: Some(fetch_args),
        })
        .await
        .expect("fetch_build_output should succeed");

    let _ = client.cancel().await;
    let _ = server_task.await;

    let payload = fetch_response
        .structured_content
        .expect("structured_content");
    assert_eq!(
        payload.get("status").and_then(|v| v.as_str()),
        Some("succeeded")
    );
    assert_eq!(
        payload.get("job_id").and_then(|v| v.as_str()),
        Some(job_id.as_str())
    );
    assert!(
        payload
            .get("artifact_zip")
            .and_then(|v| v.as_str())
            .is_some(),
        "artifact_zip should be present"
    );
    assert!(
        payload.get("sha256").and_then(|v| v.as_str()).is_some(),
        "sha256 should be present"
    );
    assert!(
        payload
            .get("download_ttl_seconds")
            .and_then(|v| v.as_u64())
            .is_some(),
        "download_ttl_seconds should be present"
    );
    Ok(())
}

#[tokio::test]
async fn fetch_tool_reports_expiration_after_ttl() -> Result<()> {
    enable_fast_timeout();
    let config = test_server_config_with_ttl(20, 1);
    let server = build_server(config);
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        server.serve(server_transport).await?.waiting().await?;
        Result::<_, anyhow::Error>::Ok(())
    });
    let client = serve_client(ClientInfo::default(), client_transport).await?;

    let args = json!({
        "project_path": allowed_project_path().to_string_lossy(),
        "scheme": "SampleApp",
        "destination": "platform=iOS Simulator,name=iPhone 16",
        "env_overrides": {
            "MOCK_XCODEBUILD_BEHAVIOR": "success"
        }
    })
    .as_object()
    .expect("JSON object")
    .clone();

    let build_response = client
        .call_tool(CallToolRequestParam {
            name: "build_project".into(),
            arguments: Some(args),
        })
        .await
        .expect("build_project should succeed");
    let build_payload = build_response
        .structured_content
        .expect("structured_content");
    let job_id = build_payload
        .get("job_id")
        .and_then(|v| v.as_str())
        .expect("job_id")
        .to_string();

    tokio::time::sleep(Duration::from_secs(2)).await;

    let fetch_args = json!({ "job_id": job_id.clone() })
        .as_object()
        .expect("object")
        .clone();

    let fetch_result = client
        .call_tool(CallToolRequestParam {
            name: "fetch_build_output".into(),
            arguments: Some(fetch_args),
        })
        .await;

    let _ = client.cancel().await;
    let _ = server_task.await;

    let error = fetch_result.expect_err("artifact should expire");
    match error {
        ServiceError::McpError(inner) => {
            assert_error_metadata(&inner, "artifact_expired", "compliant", true);
        }
        other => panic!("unexpected error: {other:?}", other = other),
    }
    Ok(())
}

#[tokio::test]
async fn fetch_tool_rejects_unknown_job() -> Result<()> {
    enable_fast_timeout();
    let config = test_server_config(20);
    let server = build_server(config);
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        server.serve(server_transport).await?.waiting().await?;
        Result::<_, anyhow::Error>::Ok(())
    });
    let client = serve_client(ClientInfo::default(), client_transport).await?;

    let fetch_args = json!({ "job_id": Uuid::new_v4().to_string() })
        .as_object()
        .expect("object")
        .clone();

    let fetch_result = client
        .call_tool(CallToolRequestParam {
            name: "fetch_build_output".into(),
            arguments: Some(fetch_args),
        })
        .await;

    let _ = client.cancel().await;
    let _ = server_task.await;

    let error = fetch_result.expect_err("unknown job should be rejected");
    match error {
        ServiceError::McpError(inner) => {
            assert_error_metadata(&inner, "job_not_found", "compliant", false);
        }
        other => panic!("unexpected error: {other:?}", other = other),
    }
    Ok(())
}

fn allowed_project_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/xcode/workspace/SampleApp")
}

fn test_server_config(max_build_minutes: u16) -> ServerConfig {
    let workspace = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/xcode/workspace");
    ServerConfig {
        server: ServerSection {
            host: "127.0.0.1".into(),
            port: 8787,
        },
        auth: AuthSection {
            token: "test-token".into(),
        },
        xcode: XcodeConfig {
            allowed_paths: vec![workspace],
            allowed_schemes: vec!["SampleApp".into()],
            default_destination: "platform=iOS Simulator,name=iPhone 16".into(),
            developer_dir: PathBuf::from("/Applications/Xcode.app/Contents/Developer"),
            xcodebuild_path: mock_xcodebuild_path(),
            max_build_minutes,
            artifact_ttl_secs: 600,
            cleanup_schedule_secs: 60,
        },
        simulator: SimulatorConfig {
            xcrun_path: PathBuf::from("/usr/bin/xcrun"),
            max_log_capture_secs: 30,
        },
        source_path: PathBuf::from("tests/fixtures/config_valid.toml"),
    }
}

fn test_server_config_with_ttl(max_build_minutes: u16, ttl_secs: u32) -> ServerConfig {
    let mut config = test_server_config(max_build_minutes);
    config.xcode.artifact_ttl_secs = ttl_secs;
    config.xcode.cleanup_schedule_secs = 30;
    config
}

fn mock_xcodebuild_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/xcode/mock-xcodebuild.sh")
}

fn build_server(config: ServerConfig) -> XcBridgeServer {
    XcBridgeServer::new(config, "xcbridge-integration".into())
}

fn assert_error_metadata(
    error: &rmcp::model::ErrorData,
    expected_code: &str,
    expected_policy: &str,
    expected_retryable: bool,
) {
    let code = error_field(error, "code").and_then(Value::as_str);
    assert_eq!(code, Some(expected_code));
    let policy_state = error_field(error, "policy_state").and_then(Value::as_str);
    assert_eq!(policy_state, Some(expected_policy));
    let retryable = error_field(error, "retryable").and_then(Value::as_bool);
    assert_eq!(retryable, Some(expected_retryable));
    let remediation = error_field(error, "remediation")
        .and_then(Value::as_str)
        .unwrap_or_default();
    assert!(
        !remediation.is_empty(),
        "remediation should not be empty for code={expected_code}"
    );
}

fn error_field<'a>(error: &'a rmcp::model::ErrorData, key: &str) -> Option<&'a Value> {
    error.data.as_ref().and_then(|data| data.get(key))
}

fn enable_fast_timeout() {
    env::set_var("XCBRIDGE_TEST_TIME_SCALE", "1");
}
