use anyhow::Result;

use crate::Context;

/// Mirror every group, then build. Either phase failing aborts the run.
pub async fn run(ctx: &Context) -> Result<()> {
    super::mirror::mirror(ctx, None).await?;

    if ctx.config.build.is_some() {
        super::build::build(ctx).await?;
    } else {
        tracing::info!("No build configured; done after mirroring");
    }
    Ok(())
}
