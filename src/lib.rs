//! Core library for the `ansible-vagrant` test-fixture harness.
//!
//! The crate drives a Vagrant environment through its lifecycle (resolve
//! project layout → bring machines up → parse `vagrant ssh-config` → apply an
//! Ansible playbook → hand out SSH handles → tear down under a policy). Every
//! external program is reached through [`process::CommandRunner`], so the
//! whole lifecycle can be exercised without a hypervisor.

pub mod ansible;
pub mod config;
pub mod descriptor;
pub mod inventory;
pub mod layout;
pub mod orchestrator;
pub mod playbook;
pub mod process;
pub mod remote;
pub mod shutdown;
pub mod ssh_config;
pub mod test_support;
pub mod vagrant;

pub use ansible::{
    AnsiblePlaybook, InventorySource, PlaybookError, PlaybookOutcome, PlaybookRequest,
    PlaybookRunner, PlaybookStatus,
};
pub use config::{ConfigError, HarnessConfig};
pub use descriptor::{ConnectionDescriptor, DescriptorError, HostMap};
pub use inventory::{ExtraVars, Inventory, InventoryError};
pub use layout::{LayoutError, ProjectLayout};
pub use orchestrator::{
    HostHandles, LifecycleOrchestrator, LifecycleState, OrchestratorError, OrchestratorSettings,
    RunRequest, VagrantFixture, VagrantOrchestrator,
};
pub use playbook::PlaybookFileError;
pub use process::{CommandError, CommandOutput, CommandRunner, CommandSpec, ProcessCommandRunner};
pub use remote::{HandleError, HandleFactory, SshHost, SshHostFactory, SshTarget};
pub use shutdown::{ShutdownPolicy, ShutdownPolicyError};
pub use ssh_config::SshConfigError;
pub use vagrant::{Provider, ProviderError, VagrantCli, VagrantSettings};
