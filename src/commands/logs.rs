// ABOUTME: Logs command implementation.
// ABOUTME: Prints or follows the named container's output.

use futures::StreamExt;

use super::runtime_connection::connect_to_runtime;
use shipit::config::RunConfig;
use shipit::error::{Error, Result};
use shipit::output::Output;
use shipit::deploy::inspect_by_name;
use shipit::runtime::{LogOps, LogOptions, LogStream};

pub async fn logs(config: RunConfig, tail: u64, follow: bool, output: Output) -> Result<()> {
    let runtime = connect_to_runtime(&config, &output).await?;
    let name = config.container.as_str();

    let info = match inspect_by_name(&runtime, name).await {
        Ok(Some(info)) => info,
        Ok(None) => return Err(Error::ContainerNotFound(name.to_string())),
        Err(e) => return Err(Error::Engine(e.to_string())),
    };

    let opts = if follow {
        LogOptions::follow(Some(tail))
    } else {
        LogOptions::tail(tail)
    };

    let mut stream = runtime
        .container_logs(&info.id, &opts)
        .await
        .map_err(|e| Error::Engine(e.to_string()))?;

    while let Some(line) = stream.next().await {
        let line = line.map_err(|e| Error::Engine(e.to_string()))?;
        match line.stream {
            LogStream::Stdout => print!("{}", line.content),
            LogStream::Stderr => eprint!("{}", line.content),
        }
    }

    Ok(())
}
