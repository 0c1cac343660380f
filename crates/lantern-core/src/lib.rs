//! Orchestration: instrument a target, synthesize candidates, hand the
//! suite to the toolchain and read back what survived.

pub mod campaign;
pub mod config;
pub mod retry;
pub mod suite;
pub mod toolchain;

pub use campaign::{Campaign, CampaignError, CampaignReport, MockSpec, TargetRequest};
pub use config::{ConfigError, LanternConfig, RetryConfig};
pub use retry::{retry_with_timeout, RetryError};
pub use suite::{render_suite, CandidateText, SuiteSettings, SUITE_MODULE};
pub use toolchain::{RunOutput, Toolchain, ToolchainError};
