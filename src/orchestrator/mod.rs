//! Environment lifecycle orchestration.
//!
//! The orchestrator resolves the project layout and control file, brings the
//! machines up, discovers their connection descriptors, applies a playbook
//! and hands out live handles. Teardown is gated on the control file having
//! been resolved, so an environment that never reached start-up is never
//! touched.

mod error;

use std::fmt;
use std::ops::{Deref, DerefMut};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::ansible::{AnsiblePlaybook, InventorySource, PlaybookRequest, PlaybookRunner};
use crate::config::HarnessConfig;
use crate::descriptor::HostMap;
use crate::inventory::{
    ExtraVars, Inventory, SYNTHETIC_HOST_ALIAS, build_inventory, connection_vars,
    merge_extra_vars, strip_connection_vars, write_inventory,
};
use crate::layout::{ProjectLayout, infer_project_dir_from_cwd};
use crate::playbook::{extract_play_hosts, resolve_inventory_path, resolve_playbook_path};
use crate::process::{CommandOutput, ProcessCommandRunner};
use crate::remote::{HandleFactory, SshHostFactory, SshTarget};
use crate::shutdown::ShutdownPolicy;
use crate::ssh_config::{SshConfigError, parse_all, parse_one};
use crate::vagrant::{Provider, VagrantCli};

pub use error::OrchestratorError;

/// Orchestrator wired to the real `vagrant`, `ansible-playbook` and `ssh`
/// binaries.
pub type VagrantOrchestrator = LifecycleOrchestrator<
    VagrantCli<ProcessCommandRunner>,
    AnsiblePlaybook<ProcessCommandRunner>,
    SshHostFactory<ProcessCommandRunner>,
>;

/// Defaults applied to every run of one orchestrator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrchestratorSettings {
    /// Default project root.
    pub project_dir: Utf8PathBuf,
    /// Control-file override that wins over per-run values.
    pub vagrant_file: Option<String>,
    /// Artifact directory override that wins over per-run values.
    pub artifact_dir: Option<String>,
    /// Default provider back-end.
    pub provider: String,
}

impl OrchestratorSettings {
    /// Settings with no overrides and the default back-end.
    #[must_use]
    pub fn new(project_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            vagrant_file: None,
            artifact_dir: None,
            provider: String::from(crate::vagrant::DEFAULT_BACKEND),
        }
    }

    /// Settings drawn from configuration. The configured project root wins;
    /// otherwise the root is inferred from `working_dir` by walking up to
    /// the nearest `tests` directory.
    #[must_use]
    pub fn from_config(config: &HarnessConfig, working_dir: &Utf8Path) -> Self {
        Self {
            project_dir: config
                .project_dir
                .as_deref()
                .map_or_else(|| infer_project_dir_from_cwd(working_dir), Utf8PathBuf::from),
            vagrant_file: config.vagrant_file.clone(),
            artifact_dir: config.artifact_dir.clone(),
            provider: config.provider.clone(),
        }
    }
}

/// Parameters for one provisioning cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct RunRequest {
    playbook: String,
    project_dir: Option<Utf8PathBuf>,
    vagrant_file: Option<String>,
    provider: Option<String>,
    extra_vars: ExtraVars,
    inventory: Option<String>,
    artifact_dir: Option<String>,
    target: Option<String>,
}

impl RunRequest {
    /// Starts a request for `playbook`, relative to the project root or
    /// absolute.
    #[must_use]
    pub fn new(playbook: impl Into<String>) -> Self {
        Self {
            playbook: playbook.into(),
            project_dir: None,
            vagrant_file: None,
            provider: None,
            extra_vars: ExtraVars::new(),
            inventory: None,
            artifact_dir: None,
            target: None,
        }
    }

    /// Overrides the project root for this run.
    #[must_use]
    pub fn project_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    /// Selects a control file for this run.
    #[must_use]
    pub fn vagrant_file(mut self, path: impl Into<String>) -> Self {
        self.vagrant_file = Some(path.into());
        self
    }

    /// Selects the provider back-end for this run.
    #[must_use]
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.provider = Some(name.into());
        self
    }

    /// Adds caller variables; connection variables always win over them.
    #[must_use]
    pub fn extra_vars(mut self, vars: ExtraVars) -> Self {
        self.extra_vars = vars;
        self
    }

    /// Uses an existing inventory file or host list instead of a generated one.
    #[must_use]
    pub fn inventory(mut self, reference: impl Into<String>) -> Self {
        self.inventory = Some(reference.into());
        self
    }

    /// Selects the artifact directory for this run.
    #[must_use]
    pub fn artifact_dir(mut self, dir: impl Into<String>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// Narrows the run to a single host alias.
    #[must_use]
    pub fn target(mut self, alias: impl Into<String>) -> Self {
        self.target = Some(alias.into());
        self
    }
}

/// Lifecycle of one environment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    /// No control file resolved yet.
    Unstarted,
    /// Control file resolved and start-up invoked.
    Starting,
    /// Descriptors obtained and handles built.
    Ready,
    /// Teardown attempted.
    TornDown,
}

/// Handles in alias order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostHandles<H> {
    entries: Vec<(String, H)>,
}

impl<H> HostHandles<H> {
    /// Looks up a handle by alias.
    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&H> {
        self.entries
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, handle)| handle)
    }

    /// Aliases in discovery order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(alias, _)| alias.as_str())
    }

    /// Alias and handle pairs in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &H)> {
        self.entries
            .iter()
            .map(|(alias, handle)| (alias.as_str(), handle))
    }

    /// Number of handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when there are no handles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
struct Environment<H> {
    descriptors: HostMap,
    handles: HostHandles<H>,
    primary: String,
}

/// Stateful coordinator for one control-file lifecycle.
#[derive(Debug)]
pub struct LifecycleOrchestrator<P, A, F: HandleFactory> {
    settings: OrchestratorSettings,
    layout: ProjectLayout,
    provider: P,
    playbook_runner: A,
    handle_factory: F,
    state: LifecycleState,
    control_file: Option<Utf8PathBuf>,
    environment: Option<Environment<F::Handle>>,
}

impl VagrantOrchestrator {
    /// Builds an orchestrator from configuration using real processes.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::StructuralLayout`] when the project root
    /// is not a valid layout.
    pub fn from_config(
        config: &HarnessConfig,
        working_dir: &Utf8Path,
    ) -> Result<Self, OrchestratorError> {
        Self::new(
            OrchestratorSettings::from_config(config, working_dir),
            VagrantCli::with_process_runner(config.vagrant_settings()),
            AnsiblePlaybook::with_process_runner(config.ansible_playbook_bin.clone()),
            SshHostFactory::with_process_runner(config.ssh_bin.clone()),
        )
    }
}

impl<P, A, F> LifecycleOrchestrator<P, A, F>
where
    P: Provider,
    A: PlaybookRunner,
    F: HandleFactory,
{
    /// Creates an orchestrator after validating the default project root.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::StructuralLayout`] when the root lacks
    /// `tests/` or `roles/`.
    pub fn new(
        settings: OrchestratorSettings,
        provider: P,
        playbook_runner: A,
        handle_factory: F,
    ) -> Result<Self, OrchestratorError> {
        let layout = ProjectLayout::validate(&settings.project_dir)?;
        debug!(project_dir = %layout.root(), "project layout validated");
        Ok(Self {
            settings,
            layout,
            provider,
            playbook_runner,
            handle_factory,
            state: LifecycleState::Unstarted,
            control_file: None,
            environment: None,
        })
    }

    /// Provisions the environment and returns handles for the target hosts.
    ///
    /// A repeated call replaces every descriptor and handle from the
    /// previous run.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] for layout, lookup, start-up, discovery,
    /// playbook and handle failures. Nothing past the failing step runs.
    pub fn run(
        &mut self,
        request: &RunRequest,
    ) -> Result<&HostHandles<F::Handle>, OrchestratorError> {
        let layout = match &request.project_dir {
            Some(dir) => ProjectLayout::validate(dir)?,
            None => self.layout.clone(),
        };
        let playbook = resolve_playbook_path(layout.root(), &request.playbook)
            .map_err(OrchestratorError::PlaybookNotFound)?;
        let caller_inventory = resolve_inventory_path(layout.root(), request.inventory.as_deref());

        let control_file = layout.control_file(
            self.settings.vagrant_file.as_deref(),
            request.vagrant_file.as_deref(),
        );
        if !control_file.exists() {
            return Err(OrchestratorError::ControlFileNotFound { path: control_file });
        }
        debug!(control_file = %control_file, playbook = %playbook, "resolved environment paths");
        self.control_file = Some(control_file.clone());
        self.state = LifecycleState::Starting;

        let backend = request
            .provider
            .as_deref()
            .unwrap_or(&self.settings.provider);
        self.provider.start(&control_file, backend)?;

        let text = self.provider.ssh_config(&control_file)?;
        let targets = Self::select_targets(&text, request.target.as_deref())?;
        info!(hosts = %targets.alias_list(), "discovered vagrant hosts");

        let artifact_dir = layout.artifact_dir(
            self.settings.artifact_dir.as_deref(),
            request.artifact_dir.as_deref(),
        );
        let (inventory, extra_vars) = Self::prepare_inventory(
            &playbook,
            &targets,
            caller_inventory,
            &request.extra_vars,
            &artifact_dir,
        )?;

        let outcome = self.playbook_runner.run(&PlaybookRequest {
            playbook,
            project_dir: layout.root().to_path_buf(),
            roles_path: layout.roles_dir(),
            inventory,
            extra_vars,
            artifact_dir,
        })?;
        if !outcome.is_success() {
            return Err(OrchestratorError::PlaybookFailed {
                status: outcome.status,
                rc: outcome.rc,
            });
        }

        let mut entries = Vec::with_capacity(targets.len());
        for (alias, descriptor) in targets.iter() {
            let handle = self
                .handle_factory
                .connect(&SshTarget::from_descriptor(descriptor))?;
            entries.push((alias.to_owned(), handle));
        }
        let primary = request
            .target
            .clone()
            .or_else(|| targets.first().map(|(alias, _)| alias.to_owned()))
            .unwrap_or_default();

        self.state = LifecycleState::Ready;
        let environment = self.environment.insert(Environment {
            descriptors: targets,
            handles: HostHandles { entries },
            primary,
        });
        Ok(&environment.handles)
    }

    /// Primary handle: the requested target, or the first discovered host.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotInvoked`] before a successful run.
    pub fn host(&self) -> Result<&F::Handle, OrchestratorError> {
        let environment = self.environment()?;
        self.get_host(&environment.primary)
    }

    /// Every handle from the latest successful run.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotInvoked`] before a successful run.
    pub fn hosts(&self) -> Result<&HostHandles<F::Handle>, OrchestratorError> {
        Ok(&self.environment()?.handles)
    }

    /// Handle for `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotInvoked`] before a successful run and
    /// [`OrchestratorError::HostNotFound`] listing the present aliases when
    /// `alias` is not among them.
    pub fn get_host(&self, alias: &str) -> Result<&F::Handle, OrchestratorError> {
        let handles = &self.environment()?.handles;
        handles
            .get(alias)
            .ok_or_else(|| OrchestratorError::HostNotFound {
                alias: alias.to_owned(),
                available: handles.aliases().map(str::to_owned).collect(),
            })
    }

    /// Descriptors for the hosts of the latest successful run.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotInvoked`] before a successful run.
    pub fn ssh_configs(&self) -> Result<&HostMap, OrchestratorError> {
        Ok(&self.environment()?.descriptors)
    }

    /// Control file resolved by the latest run, if any.
    #[must_use]
    pub fn control_file(&self) -> Option<&Utf8Path> {
        self.control_file.as_deref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Adopts an environment provisioned by an earlier process so that
    /// [`Self::teardown`] can act on it.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ControlFileNotFound`] when the resolved
    /// control file does not exist.
    pub fn attach(&mut self, vagrant_file: Option<&str>) -> Result<&Utf8Path, OrchestratorError> {
        let control_file = self
            .layout
            .control_file(self.settings.vagrant_file.as_deref(), vagrant_file);
        if !control_file.exists() {
            return Err(OrchestratorError::ControlFileNotFound { path: control_file });
        }
        debug!(control_file = %control_file, "attached to existing environment");
        self.state = LifecycleState::Ready;
        Ok(self.control_file.insert(control_file))
    }

    /// Applies `policy` to the environment.
    ///
    /// Does nothing when no control file was resolved or the environment is
    /// already torn down. Provider failures are logged and never raised.
    /// Returns the provider output when a command ran.
    pub fn teardown(&mut self, policy: ShutdownPolicy) -> Option<CommandOutput> {
        let Some(control_file) = self.control_file.clone() else {
            debug!("teardown skipped: no control file resolved");
            return None;
        };
        if self.state == LifecycleState::TornDown {
            debug!(control_file = %control_file, "teardown skipped: already torn down");
            return None;
        }
        self.state = LifecycleState::TornDown;

        info!(control_file = %control_file, %policy, "tearing down vagrant environment");
        let result = match policy {
            ShutdownPolicy::None => return None,
            ShutdownPolicy::Halt => self.provider.halt(&control_file),
            ShutdownPolicy::Destroy => self.provider.destroy(&control_file),
        };
        match result {
            Ok(output) => {
                if !output.is_success() {
                    warn!(
                        %policy,
                        status = %output.status_text(),
                        stderr = %output.stderr.trim(),
                        "teardown command failed; ignoring"
                    );
                }
                Some(output)
            }
            Err(err) => {
                warn!(%policy, error = %err, "teardown command could not run; ignoring");
                None
            }
        }
    }

    fn environment(&self) -> Result<&Environment<F::Handle>, OrchestratorError> {
        self.environment.as_ref().ok_or(OrchestratorError::NotInvoked)
    }

    fn select_targets(text: &str, target: Option<&str>) -> Result<HostMap, OrchestratorError> {
        let hosts = parse_all(text);
        match target {
            Some(alias) => {
                if let Some(narrowed) = hosts.only(alias) {
                    return Ok(narrowed);
                }
                match parse_one(text, Some(alias)) {
                    Err(SshConfigError::HostNotFound { alias, .. }) => {
                        Err(OrchestratorError::HostNotFound {
                            alias,
                            available: hosts.aliases().map(str::to_owned).collect(),
                        })
                    }
                    Err(err) => Err(err.into()),
                    Ok(_) => Err(OrchestratorError::HostNotFound {
                        alias: alias.to_owned(),
                        available: hosts.aliases().map(str::to_owned).collect(),
                    }),
                }
            }
            None if hosts.is_empty() => match parse_one(text, None) {
                Err(err) => Err(err.into()),
                Ok(_) => Err(SshConfigError::NoValidHostBlocks {
                    rejected: Vec::new(),
                }
                .into()),
            },
            None => Ok(hosts),
        }
    }

    fn prepare_inventory(
        playbook: &Utf8Path,
        targets: &HostMap,
        caller_inventory: Option<String>,
        caller_vars: &ExtraVars,
        artifact_dir: &Utf8Path,
    ) -> Result<(InventorySource, ExtraVars), OrchestratorError> {
        if let Some(reference) = caller_inventory {
            let extra_vars = match (targets.len(), targets.first()) {
                (1, Some((_, descriptor))) => {
                    merge_extra_vars(caller_vars, &connection_vars(descriptor))
                }
                _ => caller_vars.clone(),
            };
            return Ok((InventorySource::from_reference(reference), extra_vars));
        }

        let mut patterns =
            extract_play_hosts(playbook).map_err(OrchestratorError::PlaybookFile)?;
        if patterns.is_empty() {
            patterns.push(String::from(SYNTHETIC_HOST_ALIAS));
        }

        match build_inventory(targets, &patterns) {
            inline @ Inventory::Inline(_) => {
                let hosts = inline.host_list().unwrap_or_default();
                let connection = inline.inline_vars().cloned().unwrap_or_default();
                Ok((
                    InventorySource::HostList(hosts),
                    merge_extra_vars(caller_vars, &connection),
                ))
            }
            Inventory::Generated { content } => {
                let path = write_inventory(artifact_dir, &content)?;
                let (kept, dropped) = strip_connection_vars(caller_vars);
                if !dropped.is_empty() {
                    warn!(
                        dropped = %dropped.join(", "),
                        "caller extra vars would shadow generated inventory; dropping"
                    );
                }
                debug!(inventory = %path, "wrote generated inventory");
                Ok((InventorySource::File(path), kept))
            }
        }
    }
}

/// Scope guard that tears the environment down when dropped.
pub struct VagrantFixture<P, A, F>
where
    P: Provider,
    A: PlaybookRunner,
    F: HandleFactory,
{
    orchestrator: LifecycleOrchestrator<P, A, F>,
    policy: ShutdownPolicy,
}

impl<P, A, F> VagrantFixture<P, A, F>
where
    P: Provider,
    A: PlaybookRunner,
    F: HandleFactory,
{
    /// Wraps `orchestrator`, applying `policy` on drop.
    #[must_use]
    pub const fn new(orchestrator: LifecycleOrchestrator<P, A, F>, policy: ShutdownPolicy) -> Self {
        Self {
            orchestrator,
            policy,
        }
    }

    /// Policy applied on drop.
    #[must_use]
    pub const fn policy(&self) -> ShutdownPolicy {
        self.policy
    }
}

impl<P, A, F> fmt::Debug for VagrantFixture<P, A, F>
where
    P: Provider + fmt::Debug,
    A: PlaybookRunner + fmt::Debug,
    F: HandleFactory + fmt::Debug,
    F::Handle: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VagrantFixture")
            .field("orchestrator", &self.orchestrator)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<P, A, F> Deref for VagrantFixture<P, A, F>
where
    P: Provider,
    A: PlaybookRunner,
    F: HandleFactory,
{
    type Target = LifecycleOrchestrator<P, A, F>;

    fn deref(&self) -> &Self::Target {
        &self.orchestrator
    }
}

impl<P, A, F> DerefMut for VagrantFixture<P, A, F>
where
    P: Provider,
    A: PlaybookRunner,
    F: HandleFactory,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.orchestrator
    }
}

impl<P, A, F> Drop for VagrantFixture<P, A, F>
where
    P: Provider,
    A: PlaybookRunner,
    F: HandleFactory,
{
    fn drop(&mut self) {
        self.orchestrator.teardown(self.policy);
    }
}

#[cfg(test)]
mod tests;
