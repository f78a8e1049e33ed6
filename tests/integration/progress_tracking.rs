use std::{env, path::PathBuf};

use anyhow::Result;
use rmcp::{
    model::{CallToolRequestParam, ClientInfo},
    serve_client, ServiceExt,
};
use serde_json::json;

use xcbridge_mcp::server::{
    config::{AuthSection, ServerConfig, ServerSection, SimulatorConfig, XcodeConfig},
    progress::{BufferSink, ProgressRegistry},
    runtime::XcBridgeServer,
};

#[tokio::test]
async fn build_emits_progress_lifecycle_and_clears_registry() -> Result<()> {
    env::set_var("XCBRIDGE_TEST_TIME_SCALE", "1");
    let registry = ProgressRegistry::new();
    let sink = BufferSink::new();
    let server = XcBridgeServer::with_progress(
        test_server_config(),
        "progress-integration".into(),
        registry.clone(),
        Box::new(sink.clone()),
    );
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

    client
        .call_tool(CallToolRequestParam {
            name: "build_project".into(),
            arguments: Some(args),
        })
        .await
        .expect("build_project should succeed");

    let _ = client.cancel().await;
    let _ = server_task.await;

    let lines = sink.lines();
    assert!(
        lines
            .iter()
            .any(|line| line.contains("RUNNING") && line.contains("Build:")),
        "expected a RUNNING trace line, got {lines:?}"
    );
    assert!(
        lines.iter().any(|line| line.contains("COMPLETED")),
        "expected a COMPLETED trace line, got {lines:?}"
    );
    let first = lines.first().expect("at least one trace line");
    assert!(
        first.starts_with("Operation [") && first.ends_with("(0%)"),
        "queued line should render progress 0: {first}"
    );

    assert!(
        registry.snapshot().is_empty(),
        "terminal report must clear the registry"
    );
    Ok(())
}

#[tokio::test]
async fn failed_operation_emits_failed_line_and_clears_registry() -> Result<()> {
    env::set_var("XCBRIDGE_TEST_TIME_SCALE", "1");
    let registry = ProgressRegistry::new();
    let sink = BufferSink::new();
    let mut config = test_server_config();
    // point simctl at a binary that cannot exist so install_app fails fast
    config.simulator.xcrun_path = PathBuf::from("/nonexistent/xcbridge-test/xcrun");
    let server = XcBridgeServer::with_progress(
        config,
        "progress-integration".into(),
        registry.clone(),
        Box::new(sink.clone()),
    );
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    let server_task = tokio::spawn(async move {
        server.serve(server_transport).await?.waiting().await?;
        Result::<_, anyhow::Error>::Ok(())
    });
    let client = serve_client(ClientInfo::default(), client_transport).await?;

    let args = json!({
        "udid": "booted",
        "app_path": allowed_project_path()
            .join("Sample.app")
            .to_string_lossy()
    })
    .as_object()
    .expect("JSON object")
    .clone();

    let result = client
        .call_tool(CallToolRequestParam {
            name: "install_app".into(),
            arguments: Some(args),
        })
        .await;

    let _ = client.cancel().await;
    let _ = server_task.await;

    result.expect_err("install through a missing xcrun must fail");

    let lines = sink.lines();
    assert!(
        lines
            .iter()
            .any(|line| line.contains("RUNNING") && line.contains("Install:")),
        "expected a RUNNING trace line, got {lines:?}"
    );
    assert!(
        lines.iter().any(|line| line.contains("FAILED")),
        "expected a FAILED trace line, got {lines:?}"
    );
    assert!(
        registry.snapshot().is_empty(),
        "failed report must clear the registry"
    );
    Ok(())
}

fn allowed_project_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/xcode/workspace/SampleApp")
}

fn test_server_config() -> ServerConfig {
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
            xcodebuild_path: PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures/xcode/mock-xcodebuild.sh"),
            max_build_minutes: 20,
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
