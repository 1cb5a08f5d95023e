use anyhow::{Context as _, Result};

use crate::Context;

/// Run the source-build pipeline.
pub async fn build(ctx: &Context) -> Result<()> {
    let Some(build) = &ctx.config.build else {
        anyhow::bail!("No [build] section configured");
    };

    let registered = ctx
        .build_pipeline(build)
        .run()
        .await
        .with_context(|| format!("Build for {} failed", build.repository))?;

    ctx.reporter.success(&format!(
        "{} package(s) published to {}",
        registered.len(),
        build.repository
    ));
    Ok(())
}
