use std::{env, path::PathBuf, sync::Arc};

use chrono::Utc;
use rmcp::{
    handler::server::{wrapper::Parameters, ServerHandler},
    model::{ErrorData, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, Json,
};
use uuid::Uuid;

use crate::{
    lib::{errors::XcodeCommandError, xcodebuild::XcodeAction},
    server::{
        config::ServerConfig,
        progress::{ProgressRegistry, ProgressUpdate, StderrSink},
    },
    tools::{
        self,
        artifacts::{
            fetch_build_output, fetch_error_to_error_data, BuildArtifactStore,
            FetchBuildOutputRequest, FetchBuildOutputResponse,
        },
        diagnostics::{self, CollectDiagnosticsRequest, CollectDiagnosticsResponse},
        simulator::{
            self, AppLifecycleResponse, CaptureLogsRequest, CaptureLogsResponse,
            CaptureScreenshotRequest, CaptureScreenshotResponse, InstallAppRequest,
            LaunchAppRequest, ListSimulatorsRequest, ListSimulatorsResponse,
            SimulatorControlRequest, SimulatorControlResponse, TerminateAppRequest,
            UninstallAppRequest,
        },
        xcode::{
            self, BuildProjectResponse, CleanProjectResponse, ListSchemesRequest,
            ListSchemesResponse, RunTestsResponse, XcodeBuildRequest, XcodeJobQueue,
        },
        ServerToolRouter,
    },
};

/// Environment toggle that registers the diagnostics tool.
pub const DEBUG_ENV: &str = "XCBRIDGE_DEBUG";

#[derive(Clone)]
pub struct XcBridgeServer {
    config: Arc<ServerConfig>,
    instructions: Arc<String>,
    tool_router: ServerToolRouter<Self>,
    xcode_queue: XcodeJobQueue,
    artifact_store: BuildArtifactStore,
    progress: ProgressRegistry,
}

impl XcBridgeServer {
    /// Build a server with a fresh progress registry bound to stderr.
    pub fn new(config: ServerConfig, instructions: String) -> Self {
        Self::with_progress(
            config,
            instructions,
            ProgressRegistry::new(),
            Box::new(StderrSink),
        )
    }

    /// Build a server around an externally constructed registry (tests
    /// inject one with a buffer sink). Binding happens here: the registry
    /// starts delivering once the server instance exists.
    pub fn with_progress(
        config: ServerConfig,
        instructions: String,
        progress: ProgressRegistry,
        sink: Box<dyn crate::server::progress::ProgressSink>,
    ) -> Self {
        progress.bind(sink);

        // Discovery tools first, then mutating tools; diagnostics only
        // when the debug toggle is set.
        let mut router = tools::build_router(Self::discovery_tool_router)
            + Self::xcode_tool_router()
            + Self::simulator_tool_router();
        if Self::diagnostics_enabled() {
            router = router + Self::diagnostics_tool_router();
        }

        let artifact_store = BuildArtifactStore::new(
            config.xcode.artifact_ttl_secs,
            config.xcode.cleanup_schedule_secs,
        );
        Self {
            config: Arc::new(config),
            instructions: Arc::new(instructions),
            tool_router: router,
            xcode_queue: XcodeJobQueue::new(),
            artifact_store,
            progress,
        }
    }

    pub fn diagnostics_enabled() -> bool {
        matches!(
            env::var(DEBUG_ENV)
                .unwrap_or_default()
                .to_lowercase()
                .as_str(),
            "1" | "true" | "yes"
        )
    }

    pub async fn pending_jobs(&self) -> usize {
        self.xcode_queue.pending_jobs().await
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    async fn record_build_failure(&self, job_id: Uuid, err: &XcodeCommandError) {
        let log_excerpt = match err {
            XcodeCommandError::CommandFailed { message, .. } => message.clone(),
            _ => err.to_string(),
        };
        if let Err(store_err) = self
            .artifact_store
            .record_failure(job_id, log_excerpt, Utc::now())
            .await
        {
            tracing::warn!(
                target: "xcbridge::xcode",
                job_id = %job_id,
                error = %store_err,
                "Failed to record build failure"
            );
        }
    }

    /// Run one queued xcodebuild job with progress reporting around it.
    async fn run_queued_job(
        &self,
        action: XcodeAction,
        operation_name: &str,
        request: &XcodeBuildRequest,
        job_id: Uuid,
    ) -> Result<xcode::build::XcodeJobOutput, XcodeCommandError> {
        let reporter = self.progress.reporter(operation_name);
        reporter.send(
            ProgressUpdate::running(job_id.to_string(), format!("{} queued", request.scheme))
                .with_progress(0),
        );
        let _ticket = self.xcode_queue.wait_for_turn(job_id).await;
        reporter.send(
            ProgressUpdate::running(job_id.to_string(), "running xcodebuild".to_string())
                .with_progress(10),
        );

        let result = xcode::build::run_xcode_job(
            action,
            request,
            &self.config.xcode,
            job_id,
            &self.artifact_store.root_dir(),
        )
        .await;
        self.xcode_queue.finish_job(job_id).await;

        match &result {
            Ok(_) => {
                reporter.send(ProgressUpdate::completed(
                    job_id.to_string(),
                    format!("{} succeeded", action.as_str()),
                ));
            }
            Err(err) => {
                reporter.send(ProgressUpdate::failed(job_id.to_string(), err.to_string()));
            }
        }
        result
    }
}

#[tool_router(router = discovery_tool_router)]
impl XcBridgeServer {
    #[tool(
        name = "list_schemes",
        description = "List schemes and configurations for an Xcode project or workspace"
    )]
    async fn list_schemes(
        &self,
        Parameters(request): Parameters<ListSchemesRequest>,
    ) -> Result<Json<ListSchemesResponse>, ErrorData> {
        match xcode::list_schemes(&request, &self.config.xcode).await {
            Ok(response) => Ok(Json(response)),
            Err(err) => Err(xcode::schemes_error_to_error_data(err)),
        }
    }

    #[tool(
        name = "list_simulators",
        description = "List available simulator devices, optionally filtered by runtime or boot state"
    )]
    async fn list_simulators(
        &self,
        Parameters(request): Parameters<ListSimulatorsRequest>,
    ) -> Result<Json<ListSimulatorsResponse>, ErrorData> {
        match simulator::list_simulators(&request, &self.config.simulator).await {
            Ok(response) => Ok(Json(response)),
            Err(err) => Err(simulator::simctl_error_to_error_data(err)),
        }
    }

    #[tool(
        name = "fetch_build_output",
        description = "Fetch metadata for the artifacts of a prior build job"
    )]
    async fn fetch_build_output(
        &self,
        Parameters(request): Parameters<FetchBuildOutputRequest>,
    ) -> Result<Json<FetchBuildOutputResponse>, ErrorData> {
        match fetch_build_output(&self.artifact_store, request).await {
            Ok(response) => Ok(Json(response)),
            Err(err) => Err(fetch_error_to_error_data(err)),
        }
    }
}

#[tool_router(router = xcode_tool_router)]
impl XcBridgeServer {
    #[tool(
        name = "build_project",
        description = "Build an Xcode project and return artifact metadata"
    )]
    async fn build_project(
        &self,
        Parameters(request): Parameters<XcodeBuildRequest>,
    ) -> Result<Json<BuildProjectResponse>, ErrorData> {
        if let Err(err) = request.validate(&self.config.xcode) {
            return Err(xcode::validation_error_to_error_data(err));
        }

        let job_id = Uuid::new_v4();
        let result = self
            .run_queued_job(XcodeAction::Build, "Build", &request, job_id)
            .await;

        match result {
            Ok(output) => {
                let artifact = output.artifact.as_ref().ok_or_else(|| {
                    xcode::runtime_error_to_error_data(
                        XcodeCommandError::ArtifactFailure {
                            message: "build job produced no artifact".into(),
                        },
                        job_id,
                    )
                })?;
                if let Err(store_err) = self
                    .artifact_store
                    .record_success(
                        job_id,
                        PathBuf::from(&artifact.zip_path),
                        artifact.sha256.clone(),
                        output.log_excerpt.clone(),
                        Utc::now(),
                    )
                    .await
                {
                    let err = XcodeCommandError::from(store_err);
                    return Err(xcode::runtime_error_to_error_data(err, job_id));
                }
                Ok(Json(BuildProjectResponse {
                    job_id: job_id.to_string(),
                    status: "succeeded",
                    artifact_path: artifact.zip_path.clone(),
                    artifact_sha256: artifact.sha256.clone(),
                    log_excerpt: output.log_excerpt,
                    duration_ms: output.duration_ms,
                }))
            }
            Err(err) => {
                self.record_build_failure(job_id, &err).await;
                Err(xcode::runtime_error_to_error_data(err, job_id))
            }
        }
    }

    #[tool(
        name = "run_tests",
        description = "Run xcodebuild tests for a scheme and return the log excerpt"
    )]
    async fn run_tests(
        &self,
        Parameters(request): Parameters<XcodeBuildRequest>,
    ) -> Result<Json<RunTestsResponse>, ErrorData> {
        if let Err(err) = request.validate(&self.config.xcode) {
            return Err(xcode::validation_error_to_error_data(err));
        }

        let job_id = Uuid::new_v4();
        let result = self
            .run_queued_job(XcodeAction::Test, "Test", &request, job_id)
            .await;

        match result {
            Ok(output) => Ok(Json(RunTestsResponse {
                job_id: job_id.to_string(),
                status: "passed",
                log_excerpt: output.log_excerpt,
                duration_ms: output.duration_ms,
            })),
            Err(err) => Err(xcode::runtime_error_to_error_data(err, job_id)),
        }
    }

    #[tool(
        name = "clean_project",
        description = "Run xcodebuild clean for a scheme"
    )]
    async fn clean_project(
        &self,
        Parameters(request): Parameters<XcodeBuildRequest>,
    ) -> Result<Json<CleanProjectResponse>, ErrorData> {
        if let Err(err) = request.validate(&self.config.xcode) {
            return Err(xcode::validation_error_to_error_data(err));
        }

        let job_id = Uuid::new_v4();
        let result = self
            .run_queued_job(XcodeAction::Clean, "Clean", &request, job_id)
            .await;

        match result {
            Ok(output) => Ok(Json(CleanProjectResponse {
                job_id: job_id.to_string(),
                status: "cleaned",
                log_excerpt: output.log_excerpt,
                duration_ms: output.duration_ms,
            })),
            Err(err) => Err(xcode::runtime_error_to_error_data(err, job_id)),
        }
    }
}

#[tool_router(router = simulator_tool_router)]
impl XcBridgeServer {
    #[tool(name = "boot_simulator", description = "Boot a simulator device")]
    async fn boot_simulator(
        &self,
        Parameters(request): Parameters<SimulatorControlRequest>,
    ) -> Result<Json<SimulatorControlResponse>, ErrorData> {
        match simulator::boot_simulator(&request, &self.config.simulator).await {
            Ok(response) => Ok(Json(response)),
            Err(err) => Err(simulator::simctl_error_to_error_data(err)),
        }
    }

    #[tool(
        name = "shutdown_simulator",
        description = "Shut down a simulator device"
    )]
    async fn shutdown_simulator(
        &self,
        Parameters(request): Parameters<SimulatorControlRequest>,
    ) -> Result<Json<SimulatorControlResponse>, ErrorData> {
        match simulator::shutdown_simulator(&request, &self.config.simulator).await {
            Ok(response) => Ok(Json(response)),
            Err(err) => Err(simulator::simctl_error_to_error_data(err)),
        }
    }

    #[tool(
        name = "install_app",
        description = "Install a built .app bundle onto a simulator"
    )]
    async fn install_app(
        &self,
        Parameters(request): Parameters<InstallAppRequest>,
    ) -> Result<Json<AppLifecycleResponse>, ErrorData> {
        let operation_id = format!("install-{}", Uuid::new_v4());
        let reporter = self.progress.reporter("Install");
        reporter.send(
            ProgressUpdate::running(
                operation_id.clone(),
                format!("installing {}", request.app_path.display()),
            )
            .with_progress(0),
        );

        match simulator::install_app(&request, &self.config.simulator, &self.config.xcode).await {
            Ok(response) => {
                reporter.send(ProgressUpdate::completed(operation_id, "install finished"));
                Ok(Json(response))
            }
            Err(err) => {
                reporter.send(ProgressUpdate::failed(operation_id, err.to_string()));
                Err(simulator::simctl_error_to_error_data(err))
            }
        }
    }

    #[tool(
        name = "uninstall_app",
        description = "Uninstall an app from a simulator by bundle identifier"
    )]
    async fn uninstall_app(
        &self,
        Parameters(request): Parameters<UninstallAppRequest>,
    ) -> Result<Json<AppLifecycleResponse>, ErrorData> {
        match simulator::uninstall_app(&request, &self.config.simulator).await {
            Ok(response) => Ok(Json(response)),
            Err(err) => Err(simulator::simctl_error_to_error_data(err)),
        }
    }

    #[tool(
        name = "launch_app",
        description = "Launch an installed app on a simulator"
    )]
    async fn launch_app(
        &self,
        Parameters(request): Parameters<LaunchAppRequest>,
    ) -> Result<Json<AppLifecycleResponse>, ErrorData> {
        match simulator::launch_app(&request, &self.config.simulator).await {
            Ok(response) => Ok(Json(response)),
            Err(err) => Err(simulator::simctl_error_to_error_data(err)),
        }
    }

    #[tool(
        name = "terminate_app",
        description = "Terminate a running app on a simulator"
    )]
    async fn terminate_app(
        &self,
        Parameters(request): Parameters<TerminateAppRequest>,
    ) -> Result<Json<AppLifecycleResponse>, ErrorData> {
        match simulator::terminate_app(&request, &self.config.simulator).await {
            Ok(response) => Ok(Json(response)),
            Err(err) => Err(simulator::simctl_error_to_error_data(err)),
        }
    }

    #[tool(
        name = "capture_screenshot",
        description = "Capture a PNG screenshot from a simulator"
    )]
    async fn capture_screenshot(
        &self,
        Parameters(request): Parameters<CaptureScreenshotRequest>,
    ) -> Result<Json<CaptureScreenshotResponse>, ErrorData> {
        let capture_dir = self.artifact_store.capture_dir();
        match simulator::capture_screenshot(&request, &self.config.simulator, &capture_dir).await {
            Ok(response) => Ok(Json(response)),
            Err(err) => Err(simulator::simctl_error_to_error_data(err)),
        }
    }

    #[tool(
        name = "capture_logs",
        description = "Stream simulator logs for a bounded window and persist the capture"
    )]
    async fn capture_logs(
        &self,
        Parameters(request): Parameters<CaptureLogsRequest>,
    ) -> Result<Json<CaptureLogsResponse>, ErrorData> {
        let operation_id = format!("logs-{}", Uuid::new_v4());
        let reporter = self.progress.reporter("LogCapture");
        reporter.send(
            ProgressUpdate::running(
                operation_id.clone(),
                format!("streaming logs from {}", request.udid),
            )
            .with_progress(0),
        );

        let capture_dir = self.artifact_store.capture_dir();
        match simulator::capture_logs(&request, &self.config.simulator, &capture_dir).await {
            Ok(response) => {
                reporter.send(ProgressUpdate::completed(
                    operation_id,
                    format!("captured {} bytes", response.bytes_captured),
                ));
                Ok(Json(response))
            }
            Err(err) => {
                reporter.send(ProgressUpdate::failed(operation_id, err.to_string()));
                Err(simulator::simctl_error_to_error_data(err))
            }
        }
    }
}

#[tool_router(router = diagnostics_tool_router)]
impl XcBridgeServer {
    #[tool(
        name = "collect_diagnostics",
        description = "Probe the host toolchain and report in-flight operations"
    )]
    async fn collect_diagnostics(
        &self,
        Parameters(request): Parameters<CollectDiagnosticsRequest>,
    ) -> Result<Json<CollectDiagnosticsResponse>, ErrorData> {
        let in_flight = self.progress.snapshot();
        let response = diagnostics::collect_diagnostics(
            request,
            &self.config.xcode,
            &self.config.simulator,
            in_flight,
        )
        .await;
        Ok(Json(response))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for XcBridgeServer {
    fn get_info(&self) -> ServerInfo {
        // The tool set differs between debug and regular launches, so the
        // listChanged capability is advertised alongside logging.
        let mut capabilities = ServerCapabilities::builder()
            .enable_tools()
            .enable_logging()
            .build();
        if let Some(tools) = capabilities.tools.as_mut() {
            tools.list_changed = Some(true);
        }
        ServerInfo {
            capabilities,
            instructions: Some((*self.instructions).clone()),
            ..ServerInfo::default()
        }
    }
}
