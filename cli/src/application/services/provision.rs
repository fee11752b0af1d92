//! Application service: VM provisioning use-case.
//!
//! Sequences disk, seed and launch through a [`ProvisioningTransaction`] so
//! that any failure, a declined confirmation or a termination signal leaves
//! nothing behind. Imports only from `crate::domain` and
//! `crate::application`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::application::abort::AbortSignal;
use crate::application::ports::{
    Confirmer, KeyStatus, LaunchSpec, ProgressReporter, ProvisionToolchain, SeedInputs,
};
use crate::application::services::transaction::ProvisioningTransaction;
use crate::domain::cloud_init::{META_DATA, NETWORK_CONFIG, SeedDocuments, USER_DATA};
use crate::domain::{KeySource, KvmLayout, ProvisionError, ResourceHandle, RollbackReport, VmConfig};

/// Where a provisioning run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionState {
    Idle,
    DiskCreated,
    SeedCreated,
    Launched,
    Committed,
    RolledBack,
}

/// Input for one provisioning run.
pub struct ProvisionRequest<'a> {
    pub config: &'a VmConfig,
    pub layout: &'a KvmLayout,
    /// Download the base image when it is not cached yet.
    pub fetch_missing_image: bool,
}

/// What a committed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionOutcome {
    pub name: String,
    pub hostname: String,
    pub username: String,
    pub disk: PathBuf,
    pub seed: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PathBuf>,
}

/// Drives one provisioning attempt. Single-use.
pub struct ProvisionOrchestrator<'a, T, C, R> {
    tools: &'a T,
    confirmer: &'a C,
    reporter: &'a R,
    abort: AbortSignal,
    state: ProvisionState,
    tx: ProvisioningTransaction,
    rollback: Option<RollbackReport>,
}

impl<'a, T, C, R> ProvisionOrchestrator<'a, T, C, R>
where
    T: ProvisionToolchain,
    C: Confirmer,
    R: ProgressReporter,
{
    pub fn new(tools: &'a T, confirmer: &'a C, reporter: &'a R, abort: AbortSignal) -> Self {
        Self {
            tools,
            confirmer,
            reporter,
            abort,
            state: ProvisionState::Idle,
            tx: ProvisioningTransaction::new(),
            rollback: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ProvisionState {
        self.state
    }

    /// The report of the rollback that ran, if the run failed.
    #[must_use]
    pub fn rollback_report(&self) -> Option<&RollbackReport> {
        self.rollback.as_ref()
    }

    /// Provision the VM described by `req`.
    ///
    /// On success everything created is adopted. On any error the
    /// transaction is rolled back before the original error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the run. Typed causes are
    /// [`ProvisionError`] values inside the `anyhow::Error`.
    pub async fn run(&mut self, req: &ProvisionRequest<'_>) -> Result<ProvisionOutcome> {
        if self.state != ProvisionState::Idle {
            anyhow::bail!("provisioning orchestrator is single-use (state: {:?})", self.state);
        }
        match self.execute(req).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(vm = %req.config.name, state = ?self.state, error = %format!("{err:#}"), "provisioning failed, rolling back");
                self.reporter.step("rolling back...");
                let report = self
                    .tx
                    .rollback(self.tools, self.tools, self.reporter)
                    .await;
                if report.failures() > 0 {
                    self.reporter.warn(&format!(
                        "rollback left {} resource(s) behind",
                        report.failures()
                    ));
                }
                self.rollback = Some(report);
                self.state = ProvisionState::RolledBack;
                Err(err)
            }
        }
    }

    async fn execute(&mut self, req: &ProvisionRequest<'_>) -> Result<ProvisionOutcome> {
        let cfg = req.config;
        self.checkpoint()?;
        cfg.validate()
            .map_err(|e| ProvisionError::PreconditionFailed(e.to_string()))?;

        // Preparation: still Idle, nothing here is a managed artifact
        // except key files generated by this run.
        self.ensure_layout(req.layout)?;
        self.checkpoint()?;
        let base = self.prepare_image(cfg, req.fetch_missing_image).await?;
        self.checkpoint()?;
        let (ssh_keys, private_key) = self.prepare_keys(cfg, req.layout).await?;
        self.checkpoint()?;
        self.confirm(cfg).await?;

        let disk = self.create_disk(cfg, req.layout, &base).await?;
        self.checkpoint()?;
        let seed = self.create_seed(cfg, req.layout, &ssh_keys).await?;
        self.checkpoint()?;
        self.launch(cfg, &disk, &seed).await?;
        self.checkpoint()?;

        self.tx.commit();
        self.state = ProvisionState::Committed;
        info!(vm = %cfg.name, "provisioning committed");
        self.reporter.success(&format!("VM '{}' created", cfg.name));

        Ok(ProvisionOutcome {
            name: cfg.name.clone(),
            hostname: cfg.hostname.clone(),
            username: cfg.username.clone(),
            disk,
            seed,
            private_key,
        })
    }

    /// Fail with `SignalInterrupted` once an abort has been requested.
    fn checkpoint(&self) -> Result<()> {
        if self.abort.is_requested() {
            info!(state = ?self.state, "abort observed");
            return Err(ProvisionError::SignalInterrupted.into());
        }
        Ok(())
    }

    fn ensure_layout(&self, layout: &KvmLayout) -> Result<()> {
        for dir in layout.directories() {
            self.tools.create_dir_all(&dir)?;
        }
        Ok(())
    }

    async fn prepare_image(&self, cfg: &VmConfig, fetch_missing: bool) -> Result<PathBuf> {
        let path = self.tools.image_path(cfg.base_image);
        if self.tools.is_cached(cfg.base_image) {
            return Ok(path);
        }
        if !fetch_missing {
            return Err(ProvisionError::MissingBaseImage { path }.into());
        }
        self.reporter
            .step(&format!("downloading base image {}...", cfg.base_image));
        self.tools.fetch(cfg.base_image).await
    }

    /// Resolve the public keys to authorize. Returns the private key path
    /// when one was generated or reused for this VM.
    async fn prepare_keys(
        &mut self,
        cfg: &VmConfig,
        layout: &KvmLayout,
    ) -> Result<(Vec<String>, Option<PathBuf>)> {
        let mut keys = Vec::new();
        let mut private_key = None;
        match &cfg.key {
            KeySource::Generate => {
                let path = layout.key_path(&cfg.name);
                let pair = self
                    .tools
                    .ensure_key(&path, &format!("kvmkit-{}", cfg.name))
                    .await?;
                for file in &pair.created {
                    self.tx.register(ResourceHandle::file(file));
                }
                if pair.status == KeyStatus::Created {
                    self.reporter
                        .step(&format!("generated SSH key {}", pair.private_key.display()));
                } else {
                    self.reporter.step(&format!(
                        "reusing SSH key {}",
                        pair.private_key.display()
                    ));
                }
                keys.push(self.tools.read_public_key(&pair.public_key).await?);
                private_key = Some(pair.private_key);
            }
            KeySource::Existing(path) => {
                keys.push(self.tools.read_public_key(path).await?);
            }
            KeySource::Skip => {}
        }
        keys.extend(cfg.authorized_keys.iter().cloned());
        Ok((keys, private_key))
    }

    async fn confirm(&self, cfg: &VmConfig) -> Result<()> {
        let accepted = tokio::select! {
            answer = self.confirmer.confirm_provision(cfg) => answer?,
            () = self.abort.requested() => {
                return Err(ProvisionError::SignalInterrupted.into());
            }
        };
        if accepted {
            Ok(())
        } else {
            Err(ProvisionError::UserAborted.into())
        }
    }

    async fn create_disk(
        &mut self,
        cfg: &VmConfig,
        layout: &KvmLayout,
        base: &Path,
    ) -> Result<PathBuf> {
        if !self.tools.exists(base) {
            return Err(ProvisionError::MissingBaseImage {
                path: base.to_path_buf(),
            }
            .into());
        }
        let disk = layout.disk_path(&cfg.name);
        if self.tools.exists(&disk) {
            return Err(ProvisionError::PreconditionFailed(format!(
                "disk {} already exists",
                disk.display()
            ))
            .into());
        }

        self.reporter.step("creating VM disk...");
        let disk = self
            .tools
            .create_linked(base, &disk, &cfg.disk_size)
            .await?;
        self.tx.register(ResourceHandle::file(&disk));
        self.state = ProvisionState::DiskCreated;
        self.reporter
            .success(&format!("disk created: {}", disk.display()));
        Ok(disk)
    }

    async fn create_seed(
        &mut self,
        cfg: &VmConfig,
        layout: &KvmLayout,
        ssh_keys: &[String],
    ) -> Result<PathBuf> {
        let staging = layout.seed_staging_dir(&cfg.name);
        let seed = layout.seed_path(&cfg.name);
        for path in [&staging, &seed] {
            if self.tools.exists(path) {
                return Err(ProvisionError::PreconditionFailed(format!(
                    "{} already exists",
                    path.display()
                ))
                .into());
            }
        }

        self.reporter.step("creating cloud-init seed...");
        let docs = SeedDocuments::render(cfg, ssh_keys).context("rendering cloud-init documents")?;
        self.tools.create_dir_all(&staging)?;
        self.tx.register(ResourceHandle::directory(&staging));
        for (name, content) in docs.files() {
            self.tools.write(&staging.join(name), content)?;
        }

        let user_data = staging.join(USER_DATA);
        let meta_data = staging.join(META_DATA);
        let network_config = staging.join(NETWORK_CONFIG);
        let inputs = SeedInputs {
            user_data: &user_data,
            meta_data: &meta_data,
            network_config: &network_config,
        };
        let seed = self.tools.build(&inputs, &seed).await?;
        self.tx.register(ResourceHandle::file(&seed));
        self.state = ProvisionState::SeedCreated;
        self.reporter
            .success(&format!("seed created: {}", seed.display()));
        Ok(seed)
    }

    async fn launch(&mut self, cfg: &VmConfig, disk: &Path, seed: &Path) -> Result<()> {
        let existing = self.tools.list_names().await?;
        if existing.contains(&cfg.name) {
            return Err(ProvisionError::PreconditionFailed(format!(
                "an instance named '{}' already exists",
                cfg.name
            ))
            .into());
        }

        self.reporter.step(&format!("launching VM '{}'...", cfg.name));
        let spec = LaunchSpec {
            name: &cfg.name,
            disk,
            seed,
            memory_mb: cfg.memory_mb,
            vcpus: cfg.vcpus,
            network: &cfg.network,
            os_variant: cfg.os_variant(),
        };
        match self.tools.launch(&spec).await {
            Ok(name) => {
                self.tx.set_managed_entity(&name)?;
                self.state = ProvisionState::Launched;
                Ok(())
            }
            Err(err) => {
                // A failed launch can still leave a defined instance behind.
                if let Ok(names) = self.tools.list_names().await
                    && names.contains(&cfg.name)
                {
                    warn!(vm = %cfg.name, "launch failed after defining instance; adopting it for rollback");
                    self.tx.set_managed_entity(&cfg.name)?;
                }
                Err(err)
            }
        }
    }
}
