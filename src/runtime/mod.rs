// ABOUTME: Container engine access for the deployment pipeline.
// ABOUTME: Capability traits, the bollard-backed engine and an in-memory engine.

mod bollard;
mod context;
mod detection;
mod error;
#[cfg(any(test, feature = "testing"))]
mod memory;
mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use context::{ContextError, pack_build_context};
pub use detection::{DetectionError, detect_local, detect_runtime};
pub use error::{RuntimeError, RuntimeErrorKind};
#[cfg(any(test, feature = "testing"))]
pub use memory::{MemoryRuntime, RecordedOp};
pub use traits::*;
pub use types::{DetectedRuntime, RuntimeConfig, RuntimeType};
