// ABOUTME: Status command implementation.
// ABOUTME: Inspects the named container and probes its health endpoint once.

use serde::Serialize;

use super::runtime_connection::connect_to_runtime;
use shipit::config::RunConfig;
use shipit::deploy::{HealthProbe, HttpProbe, inspect_by_name};
use shipit::error::{Error, Result};
use shipit::output::Output;
use shipit::runtime::ContainerState;

#[derive(Serialize)]
struct StatusSummary {
    container: String,
    id: String,
    image: String,
    state: &'static str,
    created: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    health_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    health_error: Option<String>,
    access_point: String,
}

pub async fn status(config: RunConfig, output: Output) -> Result<()> {
    let runtime = connect_to_runtime(&config, &output).await?;
    let name = config.container.as_str();

    let info = match inspect_by_name(&runtime, name).await {
        Ok(Some(info)) => info,
        Ok(None) => return Err(Error::ContainerNotFound(name.to_string())),
        Err(e) => return Err(Error::Engine(e.to_string())),
    };

    let (health_status, health_error) = if info.state == ContainerState::Running {
        match HttpProbe::for_config(&config).probe().await {
            Ok(code) => (Some(code), None),
            Err(e) => (None, Some(e.to_string())),
        }
    } else {
        (None, None)
    };

    let summary = StatusSummary {
        container: info.name,
        id: info.id.short().to_string(),
        image: info.image,
        state: info.state.as_str(),
        created: info.created,
        health_status,
        health_error,
        access_point: config.access_point(),
    };

    output.json(&summary);
    output.progress(&format!("Container: {}", summary.container));
    output.progress(&format!("ID:        {}", summary.id));
    output.progress(&format!("Image:     {}", summary.image));
    output.progress(&format!("State:     {}", summary.state));
    output.progress(&format!("Created:   {}", summary.created));
    match (summary.health_status, &summary.health_error) {
        (Some(code), _) => output.progress(&format!("Health:    HTTP {}", code)),
        (None, Some(e)) => output.progress(&format!("Health:    unreachable ({})", e)),
        (None, None) => output.progress("Health:    not probed"),
    }
    output.progress(&format!("Access:    {}", summary.access_point));

    Ok(())
}
