//! Command-line interface definitions for the `ansible-vagrant` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `ansible-vagrant` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ansible-vagrant",
    about = "Provision Vagrant machines, apply an Ansible playbook and tear them down",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision, apply a playbook, and report the hosts.
    #[command(name = "run", about = "Provision, apply a playbook, and report the hosts")]
    Run(RunCommand),
    /// Apply a shutdown policy to an existing environment.
    #[command(
        name = "teardown",
        about = "Apply a shutdown policy to an existing environment"
    )]
    Teardown(TeardownCommand),
}

/// Arguments for the `ansible-vagrant run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Playbook to apply, relative to the project root or absolute.
    #[arg(value_name = "PLAYBOOK")]
    pub(crate) playbook: String,
    /// Project root containing `tests/` and `roles/`.
    ///
    /// Defaults to the configured `project_dir`, then to the parent of the
    /// nearest enclosing `tests` directory, then to the working directory.
    #[arg(long, value_name = "DIR")]
    pub(crate) project_dir: Option<String>,
    /// Vagrantfile to drive, relative to the project root or absolute.
    #[arg(long, value_name = "PATH")]
    pub(crate) vagrant_file: Option<String>,
    /// Provider back-end passed to `vagrant up --provider`.
    #[arg(long, value_name = "NAME")]
    pub(crate) provider: Option<String>,
    /// Existing inventory file or host list to use instead of a generated one.
    #[arg(long, value_name = "INVENTORY")]
    pub(crate) inventory: Option<String>,
    /// Directory that receives runner artifacts and generated inventories.
    #[arg(long, value_name = "DIR")]
    pub(crate) artifact_dir: Option<String>,
    /// Restrict the run to one host alias.
    #[arg(long, value_name = "ALIAS")]
    pub(crate) target: Option<String>,
    /// Shutdown policy applied after the run: halt, destroy or none.
    #[arg(long, value_name = "POLICY")]
    pub(crate) shutdown: Option<String>,
    /// Extra variable passed to the playbook; may be repeated.
    #[arg(short = 'e', long = "extra-var", value_name = "KEY=VALUE")]
    pub(crate) extra_vars: Vec<String>,
}

/// Arguments for the `ansible-vagrant teardown` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct TeardownCommand {
    /// Project root containing `tests/` and `roles/`.
    #[arg(long, value_name = "DIR")]
    pub(crate) project_dir: Option<String>,
    /// Vagrantfile to drive, relative to the project root or absolute.
    #[arg(long, value_name = "PATH")]
    pub(crate) vagrant_file: Option<String>,
    /// Shutdown policy to apply: halt, destroy or none.
    #[arg(long, value_name = "POLICY")]
    pub(crate) shutdown: Option<String>,
}
