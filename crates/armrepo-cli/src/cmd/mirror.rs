use std::time::Instant;

use anyhow::{Result, bail};
use armrepo_schema::{MirrorConfig, RunConfig};

use crate::Context;

/// The groups a mirror run covers: every configured group, or only the one
/// for `repository`.
pub fn resolve_groups<'a>(
    config: &'a RunConfig,
    repository: Option<&str>,
) -> Result<Vec<&'a MirrorConfig>> {
    match repository {
        Some(name) => match config.mirror_group(name) {
            Some(group) => Ok(vec![group]),
            None => bail!("No mirror group configured for repository '{name}'"),
        },
        None => Ok(config.mirror.iter().collect()),
    }
}

/// Mirror every configured group, or only the one for `repository`.
pub async fn mirror(ctx: &Context, repository: Option<&str>) -> Result<()> {
    let groups = resolve_groups(&ctx.config, repository)?;

    if groups.is_empty() {
        ctx.reporter.info("No mirror groups configured");
        return Ok(());
    }

    let start = Instant::now();
    let sync = ctx.mirror_sync();
    let mut fetched = 0;
    for group in groups {
        let report = sync.sync_group(group, &ctx.config.repo).await?;
        fetched += report.fetched.len();
    }

    tracing::info!(
        "Mirroring finished: {fetched} new artifacts in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_named_group() {
        let config = RunConfig::preset().unwrap();
        let groups = resolve_groups(&config, Some("plasma-mobile")).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].repository, "plasma-mobile");
    }

    #[test]
    fn test_resolve_all_groups() {
        let config = RunConfig::preset().unwrap();
        let groups = resolve_groups(&config, None).unwrap();
        assert_eq!(groups.len(), config.mirror.len());
    }

    #[test]
    fn test_resolve_unknown_group_fails() {
        let config = RunConfig::preset().unwrap();
        let err = resolve_groups(&config, Some("nope")).unwrap_err();
        assert!(err.to_string().contains("No mirror group configured"));
    }
}
