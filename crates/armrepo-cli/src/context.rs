//! Shared run context.
//!
//! Groups the configuration and the production implementations of every core
//! seam so command handlers do not wire them up individually.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use armrepo_core::{
    BuildPipeline, ChrootHelper, HttpDownloader, LocalIndexer, MirrorSync, RepoAdd, Reporter,
};
use armrepo_schema::{BuildConfig, RunConfig};

#[derive(Clone)]
pub struct Context {
    pub config: RunConfig,
    pub downloader: Arc<HttpDownloader>,
    pub indexer: LocalIndexer,
    pub reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(config: RunConfig, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(armrepo_core::USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        let downloader = Arc::new(HttpDownloader::new(client, reporter.clone()));
        let indexer = LocalIndexer::new(
            config.repo.clone(),
            Arc::new(RepoAdd::default()),
            reporter.clone(),
        );

        Ok(Self {
            config,
            downloader,
            indexer,
            reporter,
        })
    }

    pub fn mirror_sync(&self) -> MirrorSync {
        MirrorSync::new(
            self.downloader.clone(),
            self.indexer.clone(),
            self.reporter.clone(),
        )
    }

    pub fn build_pipeline(&self, build: &BuildConfig) -> BuildPipeline {
        BuildPipeline::new(
            build.clone(),
            self.downloader.clone(),
            Arc::new(ChrootHelper::new(build.chroot_helper.clone())),
            self.indexer.clone(),
            self.reporter.clone(),
        )
    }
}
