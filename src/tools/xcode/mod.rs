//! MCP tools wrapping `xcodebuild`.

pub mod build;
pub mod schemes;

pub use build::{
    run_xcode_job, runtime_error_to_error_data, validation_error_to_error_data,
    BuildConfiguration, BuildProjectResponse, BuildRequestValidationError, CleanProjectResponse,
    RunTestsResponse, XcodeBuildRequest, XcodeJobQueue,
};
pub use schemes::{
    list_schemes, schemes_error_to_error_data, ListSchemesError, ListSchemesRequest,
    ListSchemesResponse,
};
