use std::sync::Arc;

use tokio::runtime::Handle;

use crate::bridge::{Backend, BridgeHandle};
use crate::config::WorkerConfig;
use crate::install::PackageInstaller;
use crate::sandbox::Sandbox;

/// The six bootstrap stages, in the only order they may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStage {
    RuntimeLoad,
    PackageManagerLoad,
    FrameworkInstall,
    AgentModuleLoad,
    BridgeInjection,
    AgentImport,
}

impl BootstrapStage {
    pub const ALL: [BootstrapStage; 6] = [
        BootstrapStage::RuntimeLoad,
        BootstrapStage::PackageManagerLoad,
        BootstrapStage::FrameworkInstall,
        BootstrapStage::AgentModuleLoad,
        BootstrapStage::BridgeInjection,
        BootstrapStage::AgentImport,
    ];

    /// The progress line posted to the host before the stage begins.
    pub fn status_line(self) -> &'static str {
        match self {
            Self::RuntimeLoad => "Initializing Python runtime...",
            Self::PackageManagerLoad => "Loading package installer...",
            Self::FrameworkInstall => {
                "Installing agent graph framework (this may take a moment)..."
            }
            Self::AgentModuleLoad => "Loading agent module...",
            Self::BridgeInjection => "Wiring LLM bridge...",
            Self::AgentImport => "Importing agent entry point...",
        }
    }
}

/// Worker lifecycle state. Owned by the worker thread; other parties observe
/// it only through the message protocol. It reaches `Ready` or `Failed`
/// exactly once and is never reset afterward.
#[derive(Debug, Clone)]
pub enum WorkerState {
    Uninitialized,
    Initializing(BootstrapStage),
    Ready,
    Failed(String),
}

impl WorkerState {
    pub fn accepts_requests(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// One-shot driver for the bootstrap sequence. Stages run strictly in order;
/// a failed stage leaves the driver stuck there, and the sequence cannot be
/// resumed or retried.
pub struct Bootstrapper {
    config: WorkerConfig,
    backend: Arc<dyn Backend>,
    runtime: Handle,
    cursor: usize,
    sandbox: Option<Sandbox>,
    installer: Option<PackageInstaller>,
}

impl Bootstrapper {
    pub fn new(config: WorkerConfig, backend: Arc<dyn Backend>, runtime: Handle) -> Self {
        Self {
            config,
            backend,
            runtime,
            cursor: 0,
            sandbox: None,
            installer: None,
        }
    }

    pub fn next_stage(&self) -> Option<BootstrapStage> {
        BootstrapStage::ALL.get(self.cursor).copied()
    }

    pub fn advance(&mut self) -> anyhow::Result<()> {
        let stage = self
            .next_stage()
            .ok_or_else(|| anyhow::anyhow!("bootstrap already complete"))?;
        self.run_stage(stage)?;
        self.cursor += 1;
        Ok(())
    }

    pub fn finish(self) -> anyhow::Result<Sandbox> {
        if self.cursor < BootstrapStage::ALL.len() {
            anyhow::bail!("bootstrap incomplete");
        }
        self.sandbox
            .ok_or_else(|| anyhow::anyhow!("bootstrap produced no sandbox"))
    }

    fn run_stage(&mut self, stage: BootstrapStage) -> anyhow::Result<()> {
        match stage {
            BootstrapStage::RuntimeLoad => {
                self.sandbox = Some(Sandbox::new()?);
            }
            BootstrapStage::PackageManagerLoad => {
                let site = self.sandbox()?.site_dir().to_path_buf();
                self.installer = Some(PackageInstaller::new(self.config.registry_url.clone(), site)?);
            }
            BootstrapStage::FrameworkInstall => {
                let installer = self.installer()?;
                self.runtime
                    .block_on(installer.install(&self.config.framework_package))?;
            }
            BootstrapStage::AgentModuleLoad => {
                let source = {
                    let installer = self.installer()?;
                    self.runtime
                        .block_on(installer.fetch_text(&self.config.agent_url))?
                };
                let sandbox = self.sandbox()?;
                sandbox.write_module(&self.config.agent_module, &source)?;
                sandbox.extend_module_path()?;
            }
            BootstrapStage::BridgeInjection => {
                let bridge = BridgeHandle::new(self.backend.clone(), self.runtime.clone());
                self.sandbox()?.inject_bridge(bridge)?;
            }
            BootstrapStage::AgentImport => {
                let module = self.config.agent_module.clone();
                let entry = self.config.entry_point.clone();
                self.sandbox_mut()?.import_agent(&module, &entry)?;
            }
        }
        Ok(())
    }

    fn sandbox(&self) -> anyhow::Result<&Sandbox> {
        self.sandbox
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("runtime not loaded"))
    }

    fn sandbox_mut(&mut self) -> anyhow::Result<&mut Sandbox> {
        self.sandbox
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("runtime not loaded"))
    }

    fn installer(&self) -> anyhow::Result<&PackageInstaller> {
        self.installer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("package installer not loaded"))
    }
}
