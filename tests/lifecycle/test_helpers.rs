//! Shared fixtures and helpers for lifecycle BDD scenarios.

use std::sync::Arc;

use ansible_vagrant::test_support::{
    RecordingHandleFactory, RecordingPlaybookRunner, ScriptedRunner, ssh_config_block,
};
use ansible_vagrant::{LifecycleOrchestrator, OrchestratorSettings, VagrantCli, VagrantSettings};
use camino::{Utf8Path, Utf8PathBuf};
use rstest::fixture;
use tempfile::TempDir;

pub type TestOrchestrator = LifecycleOrchestrator<
    VagrantCli<ScriptedRunner>,
    RecordingPlaybookRunner,
    RecordingHandleFactory,
>;

#[derive(Clone, Debug)]
pub struct Project {
    pub root: Utf8PathBuf,
    _tmp: Arc<TempDir>,
}

impl Project {
    pub fn new(playbook: &str, with_vagrantfile: bool) -> Self {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("create project dir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("project path is not UTF-8: {}", path.display()));
        for dir in ["tests", "roles"] {
            create_dir(&root.join(dir));
        }
        write_file(&root.join(playbook), "- hosts: all\n  tasks: []\n");
        if with_vagrantfile {
            write_file(&root.join("Vagrantfile"), "Vagrant.configure('2') {}\n");
        }
        Self {
            root,
            _tmp: Arc::new(tmp),
        }
    }
}

#[derive(Clone, Debug)]
pub enum RunOutcome {
    Success(Vec<String>),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct LifecycleContext {
    pub project: Option<Project>,
    pub runner: ScriptedRunner,
    pub playbooks: RecordingPlaybookRunner,
    pub handles: RecordingHandleFactory,
    pub outcome: Option<RunOutcome>,
}

impl LifecycleContext {
    pub fn orchestrator(&self) -> TestOrchestrator {
        let Some(project) = self.project.as_ref() else {
            panic!("test setup requires a project");
        };
        LifecycleOrchestrator::new(
            OrchestratorSettings::new(project.root.clone()),
            VagrantCli::new(VagrantSettings::default(), self.runner.clone()),
            self.playbooks.clone(),
            self.handles.clone(),
        )
        .unwrap_or_else(|err| panic!("project layout should be valid: {err}"))
    }
}

#[fixture]
pub fn lifecycle_context() -> LifecycleContext {
    LifecycleContext {
        project: None,
        runner: ScriptedRunner::new(),
        playbooks: RecordingPlaybookRunner::new(),
        handles: RecordingHandleFactory::new(),
        outcome: None,
    }
}

/// Splits a feature-file list such as `"web, db"` into aliases.
pub fn alias_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|alias| !alias.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Renders `vagrant ssh-config` output with consecutive forwarded ports.
pub fn ssh_config_for(aliases: &[String]) -> String {
    aliases
        .iter()
        .zip(2222_u16..)
        .map(|(alias, port)| ssh_config_block(alias, "127.0.0.1", port, &format!("/keys/{alias}")))
        .collect()
}

fn create_dir(path: &Utf8Path) {
    std::fs::create_dir_all(path).unwrap_or_else(|err| panic!("create {path}: {err}"));
}

fn write_file(path: &Utf8Path, contents: &str) {
    std::fs::write(path, contents).unwrap_or_else(|err| panic!("write {path}: {err}"));
}
