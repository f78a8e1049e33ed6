//! Queued xcodebuild jobs: build, test, and clean.
mod executor;
mod queue;
mod request;

pub use executor::{
    run_xcode_job, runtime_error_to_error_data, validation_error_to_error_data,
    BuildProjectResponse, CleanProjectResponse, JobArtifact, RunTestsResponse, XcodeJobOutput,
};
pub use queue::{JobTicket, XcodeJobQueue};
pub use request::{
    BuildConfiguration, BuildRequestValidationError, XcodeBuildRequest, ALLOWED_ENV_OVERRIDES,
    ALLOWED_EXTRA_ARGS,
};
