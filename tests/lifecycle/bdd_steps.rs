//! BDD step definitions for lifecycle behaviour.

use ansible_vagrant::{InventorySource, RunRequest, ShutdownPolicy};
use rstest_bdd_macros::{given, then, when};
use serde_json::Value;

use super::test_helpers::{LifecycleContext, Project, RunOutcome, alias_list, ssh_config_for};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a project with a Vagrantfile and the playbook \"{playbook}\"")]
fn project_with_vagrantfile(
    mut lifecycle_context: LifecycleContext,
    playbook: String,
) -> LifecycleContext {
    lifecycle_context.project = Some(Project::new(playbook.trim(), true));
    lifecycle_context
}

#[given("a project without a Vagrantfile and the playbook \"{playbook}\"")]
fn project_without_vagrantfile(
    mut lifecycle_context: LifecycleContext,
    playbook: String,
) -> LifecycleContext {
    lifecycle_context.project = Some(Project::new(playbook.trim(), false));
    lifecycle_context
}

#[given("vagrant reports the hosts \"{hosts}\"")]
fn vagrant_reports_hosts(lifecycle_context: LifecycleContext, hosts: String) -> LifecycleContext {
    let runner = &lifecycle_context.runner;
    runner.push_success(); // vagrant up
    runner.push_output(Some(0), ssh_config_for(&alias_list(&hosts)), "");
    runner.push_success(); // teardown
    lifecycle_context
}

#[given("vagrant up fails")]
fn vagrant_up_fails(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.runner.push_failure(1);
    lifecycle_context.runner.push_success(); // teardown
    lifecycle_context
}

#[when("I run the playbook \"{playbook}\" with shutdown policy \"{policy}\"")]
fn run_playbook(
    mut lifecycle_context: LifecycleContext,
    playbook: String,
    policy: String,
) -> LifecycleContext {
    let shutdown = policy
        .parse::<ShutdownPolicy>()
        .unwrap_or_else(|err| panic!("feature uses a valid policy: {err}"));
    let mut orchestrator = lifecycle_context.orchestrator();
    let outcome = match orchestrator.run(&RunRequest::new(playbook.trim())) {
        Ok(handles) => RunOutcome::Success(handles.aliases().map(str::to_owned).collect()),
        Err(err) => RunOutcome::Failure(err.to_string()),
    };
    orchestrator.teardown(shutdown);
    orchestrator.teardown(shutdown);
    lifecycle_context.outcome = Some(outcome);
    lifecycle_context
}

#[then("the run yields the hosts \"{hosts}\"")]
fn run_yields_hosts(lifecycle_context: &LifecycleContext, hosts: String) -> Result<(), StepError> {
    let expected = alias_list(&hosts);
    match lifecycle_context.outcome.as_ref() {
        Some(RunOutcome::Success(aliases)) if *aliases == expected => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected hosts {expected:?}, got {other:?}"
        ))),
    }
}

#[then("the run fails mentioning \"{message}\"")]
fn run_fails(lifecycle_context: &LifecycleContext, message: String) -> Result<(), StepError> {
    match lifecycle_context.outcome.as_ref() {
        Some(RunOutcome::Failure(error)) if error.contains(message.as_str()) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure mentioning {message:?}, got {other:?}"
        ))),
    }
}

#[then("the playbook received \"{name}\" set to \"{value}\"")]
fn playbook_received_var(
    lifecycle_context: &LifecycleContext,
    name: String,
    value: String,
) -> Result<(), StepError> {
    let requests = lifecycle_context.playbooks.requests();
    let Some(request) = requests.last() else {
        return Err(StepError::Assertion(String::from("playbook never ran")));
    };
    let rendered = match request.extra_vars.get(&name) {
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
        None => None,
    };
    if rendered.as_deref() == Some(value.as_str()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {name}={value}, got {rendered:?}"
        )))
    }
}

#[then("the playbook used a generated inventory listing \"{hosts}\"")]
fn generated_inventory_lists(
    lifecycle_context: &LifecycleContext,
    hosts: String,
) -> Result<(), StepError> {
    let requests = lifecycle_context.playbooks.requests();
    let Some(request) = requests.last() else {
        return Err(StepError::Assertion(String::from("playbook never ran")));
    };
    let InventorySource::File(path) = &request.inventory else {
        return Err(StepError::Assertion(format!(
            "expected an inventory file, got {:?}",
            request.inventory
        )));
    };
    let content = std::fs::read_to_string(path)
        .map_err(|err| StepError::Assertion(format!("read {path}: {err}")))?;
    let listed: Vec<&str> = content
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .collect();
    let expected = alias_list(&hosts);
    if content.starts_with("[vagrant]") && listed == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected [vagrant] group with {expected:?}, got:\n{content}"
        )))
    }
}

#[then("vagrant was invoked as \"{command}\" exactly once")]
fn vagrant_invoked_once(
    lifecycle_context: &LifecycleContext,
    command: String,
) -> Result<(), StepError> {
    let lines = lifecycle_context.runner.command_lines();
    let count = lines.iter().filter(|line| **line == command).count();
    if count == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one {command:?} invocation, got {lines:?}"
        )))
    }
}

#[then("vagrant was never invoked")]
fn vagrant_never_invoked(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let lines = lifecycle_context.runner.command_lines();
    if lines.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no vagrant invocations, got {lines:?}"
        )))
    }
}
