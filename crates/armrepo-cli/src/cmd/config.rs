use anyhow::Result;
use armrepo_schema::RunConfig;

/// Print the effective configuration as TOML.
pub fn config(config: &RunConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
