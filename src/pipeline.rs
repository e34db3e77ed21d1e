//! Build pipeline orchestration
//!
//! A strictly sequential state machine: each stage's work completes
//! (or fails) before the next begins, and the first error short-circuits
//! straight to failure handling. Per-stage timings and build facts are
//! accumulated in the metadata store and flushed once at the end, on
//! success and on failure alike.

use crate::cache::{CacheManager, PriorBuild, RestoreOutcome};
use crate::catalog::{HttpCatalog, StaticCatalog, VersionCatalog};
use crate::context::BuildContext;
use crate::error::{MoltError, MoltResult};
use crate::hooks;
use crate::install::{
    self, ArchiveInstaller, DependencyInstaller, RuntimeInstaller, SubprocessInstaller,
};
use crate::metadata::MetadataStore;
use crate::package_manager::{self, PackageManagerKind};
use crate::profile::ProfileWriter;
use crate::version::{self, VersionSpec};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tracing::{debug, info, warn};

const METADATA_NAMESPACE: &str = "python";
const PROFILE_SCRIPT: &str = "python.sh";

/// Stages in order; every build passes through all of them or stops at
/// the first failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    VersionResolved,
    CacheRestored,
    RuntimeInstalled,
    ManagerInstalled,
    DependenciesInstalled,
    ExtrasInstalled,
    CacheSaved,
}

impl BuildStage {
    fn name(&self) -> &'static str {
        match self {
            Self::VersionResolved => "version_resolved",
            Self::CacheRestored => "cache_restored",
            Self::RuntimeInstalled => "runtime_installed",
            Self::ManagerInstalled => "manager_installed",
            Self::DependenciesInstalled => "dependencies_installed",
            Self::ExtrasInstalled => "extras_installed",
            Self::CacheSaved => "cache_saved",
        }
    }

    fn metadata_key(&self) -> String {
        format!("time_{}", self.name())
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Record the stage's elapsed time and narrate the transition
fn finish_stage(store: &mut MetadataStore, stage: BuildStage, started: Instant) {
    store.time(stage.metadata_key(), started);
    debug!("Stage {} complete", stage);
}

/// Summary of a completed build, for the final console report
#[derive(Debug)]
pub struct BuildReport {
    pub version: VersionSpec,
    pub manager: PackageManagerKind,
    pub cache_reused: bool,
    pub elapsed: std::time::Duration,
}

/// Owns the build's collaborators and drives the stages in order
pub struct Pipeline {
    ctx: BuildContext,
    catalog: Arc<dyn VersionCatalog>,
    runtime: Box<dyn RuntimeInstaller>,
    deps: Box<dyn DependencyInstaller>,
}

impl Pipeline {
    /// Production wiring: HTTP catalog when a catalog URL is
    /// configured, the built-in version table otherwise
    pub fn new(ctx: BuildContext) -> Self {
        let catalog: Arc<dyn VersionCatalog> = match ctx.var("MOLT_CATALOG_URL") {
            Some(url) => Arc::new(HttpCatalog::new(url)),
            None => Arc::new(StaticCatalog::new()),
        };
        let runtime = Box::new(ArchiveInstaller::new(&ctx));
        Self {
            ctx,
            catalog,
            runtime,
            deps: Box::new(SubprocessInstaller::new()),
        }
    }

    pub fn with_collaborators(
        ctx: BuildContext,
        catalog: Arc<dyn VersionCatalog>,
        runtime: Box<dyn RuntimeInstaller>,
        deps: Box<dyn DependencyInstaller>,
    ) -> Self {
        Self {
            ctx,
            catalog,
            runtime,
            deps,
        }
    }

    /// Run the build to completion.
    ///
    /// On failure the reason slug is recorded and the store flushed
    /// before the error propagates, so the next build can see why this
    /// one stopped.
    pub async fn run(self) -> MoltResult<BuildReport> {
        let build_started = Instant::now();
        let mut store = MetadataStore::open(&self.ctx.cache_dir, METADATA_NAMESPACE).await?;
        store.set("build_started_at", Utc::now().to_rfc3339());
        store.set("stack", &self.ctx.stack);

        match self.execute(&mut store, build_started).await {
            Ok(report) => {
                store.flush().await?;
                Ok(report)
            }
            Err(e) => {
                // The previous record still describes the artifact on
                // disk, so only the failure diagnostic is written; the
                // last successful build's facts keep driving the next
                // build's sticky version and cache validity.
                if let Err(flush_err) = store.flush_failure(e.failure_reason()).await {
                    warn!("Could not record failure in metadata: {}", flush_err);
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        store: &mut MetadataStore,
        build_started: Instant,
    ) -> MoltResult<BuildReport> {
        let ctx = &self.ctx;
        let prior = PriorBuild::from_store(store);
        let overlay = install::overlay_for(ctx);

        hooks::run_hook(ctx, &overlay, hooks::PRE_COMPILE).await?;

        // version resolution
        let started = Instant::now();
        let spec = self.resolve_version(&prior).await?;
        info!("Using Python {} ({})", spec.resolved, spec.origin);
        store.set("python_version_full", spec.resolved.to_string());
        store.set("python_version_origin", spec.origin.to_string());
        finish_stage(store, BuildStage::VersionResolved, started);

        let manager = package_manager::detect(&ctx.build_dir)?;
        store.set("package_manager", manager.to_string());
        if let Some(hash) = package_manager::dependency_hash(&ctx.build_dir, manager)? {
            store.set("dependencies_hash", hash);
        }

        // cache restore
        let started = Instant::now();
        let outcome = self.restore_cache(&prior, &spec, manager).await?;
        if outcome.reused {
            info!("Reusing cache from previous build");
        } else {
            info!("Building from a cold cache");
        }
        finish_stage(store, BuildStage::CacheRestored, started);

        // runtime install, skipped when the restored runtime is
        // already at the resolved patch
        let started = Instant::now();
        let resolved_full = spec.resolved.to_string();
        if outcome.runtime_restored && prior.version_full.as_deref() == Some(resolved_full.as_str())
        {
            debug!("Restored runtime already at {}", resolved_full);
        } else {
            if outcome.runtime_restored {
                remove_tree(&ctx.runtime_dir()).await?;
            }
            self.runtime.install(ctx, &spec.resolved).await?;
        }
        finish_stage(store, BuildStage::RuntimeInstalled, started);

        // manager bootstrap and dependency install; a warm cache makes
        // these incremental rather than skipped
        let started = Instant::now();
        self.deps.install_manager(ctx, &overlay, manager).await?;
        finish_stage(store, BuildStage::ManagerInstalled, started);

        let started = Instant::now();
        self.deps
            .install_dependencies(ctx, &overlay, manager)
            .await?;
        finish_stage(store, BuildStage::DependenciesInstalled, started);

        let started = Instant::now();
        install::extras::collect_static(ctx, &overlay).await?;
        finish_stage(store, BuildStage::ExtrasInstalled, started);

        hooks::run_hook(ctx, &overlay, hooks::POST_COMPILE).await?;

        self.write_profile().await?;

        // cache save, only reached after everything above succeeded
        let started = Instant::now();
        self.save_cache().await?;
        finish_stage(store, BuildStage::CacheSaved, started);

        Ok(BuildReport {
            version: spec,
            manager,
            cache_reused: outcome.reused,
            elapsed: build_started.elapsed(),
        })
    }

    async fn resolve_version(&self, prior: &PriorBuild) -> MoltResult<VersionSpec> {
        let catalog = Arc::clone(&self.catalog);
        let source_dir = self.ctx.build_dir.clone();
        let prior_full = prior.version_full.clone();
        let stack = self.ctx.stack.clone();

        tokio::task::spawn_blocking(move || {
            version::resolve(&source_dir, prior_full.as_deref(), &stack, catalog.as_ref())
        })
        .await
        .map_err(|e| MoltError::Internal(format!("version task panicked: {}", e)))?
    }

    async fn restore_cache(
        &self,
        prior: &PriorBuild,
        spec: &VersionSpec,
        manager: PackageManagerKind,
    ) -> MoltResult<RestoreOutcome> {
        let cache = CacheManager::new(&self.ctx.cache_dir);
        let prior = prior.clone();
        let stack = self.ctx.stack.clone();
        let resolved = spec.resolved.clone();
        let build_runtime = self.ctx.runtime_dir();
        let build_deps = self.ctx.deps_dir();

        tokio::task::spawn_blocking(move || {
            cache.restore(
                &prior,
                &stack,
                &resolved,
                manager,
                &build_runtime,
                &build_deps,
            )
        })
        .await
        .map_err(|e| MoltError::Internal(format!("cache task panicked: {}", e)))?
    }

    async fn save_cache(&self) -> MoltResult<()> {
        let cache = CacheManager::new(&self.ctx.cache_dir);
        let build_runtime = self.ctx.runtime_dir();
        let build_deps = self.ctx.deps_dir();

        tokio::task::spawn_blocking(move || cache.save(&build_runtime, &build_deps))
            .await
            .map_err(|e| MoltError::Internal(format!("cache task panicked: {}", e)))?
    }

    /// Launch-time environment, expressed relative to $HOME so the
    /// script works wherever the built tree is mounted
    async fn write_profile(&self) -> MoltResult<()> {
        let mut writer = ProfileWriter::new(&self.ctx.build_dir);
        writer.set(
            "PATH",
            "$HOME/.molt/python/bin:$HOME/.molt/deps/bin:$PATH",
        );
        writer.set(
            "LD_LIBRARY_PATH",
            "$HOME/.molt/python/lib:$LD_LIBRARY_PATH",
        );
        writer.set("LANG", "${LANG:-C.UTF-8}");
        writer.set("PYTHONUNBUFFERED", "1");
        writer.set("PYTHONUSERBASE", "$HOME/.molt/deps");
        writer.write(PROFILE_SCRIPT).await?;
        Ok(())
    }
}

async fn remove_tree(path: &std::path::Path) -> MoltResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MoltError::io(format!("removing {}", path.display()), e)),
    }
}
