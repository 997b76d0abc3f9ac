//! BDD scenarios for the environment lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Provision a single default host"
)]
fn scenario_single_default_host(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Generate an inventory for several hosts"
)]
fn scenario_generated_inventory(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Halt the environment only once"
)]
fn scenario_halt_once(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Skip teardown when the control file is missing"
)]
fn scenario_missing_control_file(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Destroy the environment after a failed start-up"
)]
fn scenario_destroy_after_failed_start(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}
