// ABOUTME: Shared helper for connecting to the local container engine.
// ABOUTME: Eliminates duplication across deploy, check, status and logs commands.

use shipit::config::RunConfig;
use shipit::error::Result;
use shipit::output::Output;
use shipit::runtime::{BollardRuntime, RuntimeError, RuntimeInfo, detect_runtime};

/// Connect to the container engine on this host.
///
/// This handles the common pattern of:
/// 1. Detecting the runtime type and socket path
/// 2. Outputting progress messages
/// 3. Establishing the connection and checking the engine answers
pub async fn connect_to_runtime(config: &RunConfig, output: &Output) -> Result<BollardRuntime> {
    output.progress("  → Detecting runtime...");
    let detected = detect_runtime(Some(&config.runtime)).map_err(RuntimeError::from)?;

    output.progress(&format!(
        "  → Found {} at {}",
        detected.runtime_type, detected.socket_path
    ));

    let runtime = BollardRuntime::connect(&detected).map_err(RuntimeError::from)?;
    runtime.ping().await.map_err(RuntimeError::from)?;

    Ok(runtime)
}
