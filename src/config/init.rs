// ABOUTME: Config scaffolding for new deployment targets.
// ABOUTME: Writes a commented shipit.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ContainerName, ImageRef};

use super::{CONFIG_FILENAME, RunConfig};

pub fn init_config(
    dir: &Path,
    container: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = RunConfig::template()?;

    if let Some(c) = container {
        config.container =
            ContainerName::new(c).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(i) = image {
        config.image = ImageRef::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    std::fs::write(&config_path, generate_template_yaml(&config))?;

    Ok(())
}

fn generate_template_yaml(config: &RunConfig) -> String {
    let volumes: String = config
        .volumes
        .iter()
        .map(|v| format!("  - \"{}:{}\"\n", v.source.display(), v.target))
        .collect();
    let keys: String = config
        .required_keys
        .iter()
        .map(|k| format!("  - {}\n", k))
        .collect();

    format!(
        r#"image: {image}
container: {container}

# Host directory holding the secrets file ({secrets}).
config_dir: {config_dir}
secrets_target: /app/.env

port: "{port}"

volumes:
{volumes}
required_keys:
{keys}
required_paths:
  - src/tools.py

# "inherit" runs as the invoking user with world-writable mounts.
# Use {{ uid: 1000, gid: 1000 }} to run as a fixed identity with chowned mounts.
# Keep the same strategy for every deploy to this target.
identity: inherit

build:
  context: .
  no_cache: true

health:
  path: {health_path}
  settle_delay: 10s
  interval: 5s
  max_attempts: 12
"#,
        image = config.image,
        container = config.container,
        secrets = config.secrets_file,
        config_dir = config.config_dir.display(),
        port = config.port,
        volumes = volumes,
        keys = keys,
        health_path = config.health.path,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_round_trips_through_parser() {
        let yaml = generate_template_yaml(&RunConfig::template().unwrap());
        let parsed = RunConfig::from_yaml(&yaml).expect("template should parse");
        assert_eq!(parsed.container.as_str(), "optitrade");
        assert_eq!(parsed.volumes.len(), 2);
        assert_eq!(parsed.required_keys.len(), 4);
    }
}
