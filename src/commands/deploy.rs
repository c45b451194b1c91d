// ABOUTME: Deploy command implementation.
// ABOUTME: Wires the local engine and host probes into the pipeline and renders the outcome.

use super::runtime_connection::connect_to_runtime;
use shipit::config::{RunConfig, invoking_identity};
use shipit::deploy::{DfProbe, HttpProbe, LocalFs, PipelineDeps, execute, render};
use shipit::error::{Error, Result};
use shipit::output::Output;

/// Run the full pipeline against the local engine.
pub async fn deploy(mut config: RunConfig, use_cache: bool, mut output: Output) -> Result<()> {
    output.start_timer();

    if use_cache {
        config.build.no_cache = false;
    }

    output.progress(&format!(
        "Deploying {} ({})",
        config.container, config.image
    ));

    let runtime = connect_to_runtime(&config, &output).await?;

    let health = HttpProbe::for_config(&config);
    let deps = PipelineDeps {
        capacity: &DfProbe,
        fs: &LocalFs,
        health: &health,
        invoking: Some(invoking_identity()),
    };

    let outcome = execute(config, &runtime, &deps, &output).await;
    render(&outcome, &output);

    match outcome.failed_stage {
        None => Ok(()),
        Some(stage) => Err(Error::RunFailed {
            stage: stage.to_string(),
        }),
    }
}
