//! Unit tests for the lifecycle orchestrator.

use super::*;
use crate::ansible::PlaybookStatus;
use crate::test_support::{
    RecordingHandleFactory, RecordingPlaybookRunner, ScriptedRunner, ssh_config_block,
};
use crate::vagrant::VagrantSettings;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;

type TestOrchestrator = LifecycleOrchestrator<
    VagrantCli<ScriptedRunner>,
    RecordingPlaybookRunner,
    RecordingHandleFactory,
>;

struct Harness {
    _tmp: TempDir,
    root: Utf8PathBuf,
    runner: ScriptedRunner,
    playbooks: RecordingPlaybookRunner,
    handles: RecordingHandleFactory,
}

impl Harness {
    fn orchestrator(&self) -> TestOrchestrator {
        self.orchestrator_with(OrchestratorSettings::new(self.root.clone()))
    }

    fn orchestrator_with(&self, settings: OrchestratorSettings) -> TestOrchestrator {
        LifecycleOrchestrator::new(
            settings,
            VagrantCli::new(VagrantSettings::default(), self.runner.clone()),
            self.playbooks.clone(),
            self.handles.clone(),
        )
        .expect("layout is valid")
    }

    fn script_start(&self, ssh_config: &str) {
        self.runner.push_success();
        self.runner.push_output(Some(0), ssh_config, "");
    }

    fn write(&self, name: &str, contents: &str) {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, contents).expect("write file");
    }
}

#[fixture]
fn harness() -> Harness {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 path");
    std::fs::create_dir_all(root.join("tests")).expect("tests dir");
    std::fs::create_dir_all(root.join("roles")).expect("roles dir");
    std::fs::write(root.join("Vagrantfile"), "Vagrant.configure('2') {}\n").expect("vagrantfile");
    std::fs::write(root.join("site.yml"), "- hosts: all\n  tasks: []\n").expect("playbook");
    Harness {
        _tmp: tmp,
        root,
        runner: ScriptedRunner::new(),
        playbooks: RecordingPlaybookRunner::new(),
        handles: RecordingHandleFactory::new(),
    }
}

fn two_hosts() -> String {
    format!(
        "{}{}",
        ssh_config_block("web", "127.0.0.1", 2222, "/keys/web"),
        ssh_config_block("db", "127.0.0.1", 2223, "/keys/db")
    )
}

fn vars(value: Value) -> ExtraVars {
    let Value::Object(map) = value else {
        panic!("expected object literal");
    };
    map
}

#[rstest]
fn single_default_host_yields_one_handle(harness: Harness) {
    harness.script_start(&ssh_config_block("default", "127.0.0.1", 2222, "/k"));
    let mut orchestrator = harness.orchestrator();

    let handles = orchestrator
        .run(&RunRequest::new("site.yml"))
        .expect("run succeeds");
    assert_eq!(handles.aliases().collect::<Vec<_>>(), ["default"]);

    let descriptor = orchestrator
        .ssh_configs()
        .expect("descriptors available")
        .get("default")
        .expect("default present");
    assert_eq!(descriptor.port(), 2222);
    assert_eq!(
        orchestrator.host().expect("primary handle").uri(),
        "ssh://vagrant@127.0.0.1:2222"
    );
    assert_eq!(orchestrator.state(), LifecycleState::Ready);
    assert_eq!(
        harness.runner.command_lines(),
        ["vagrant up --provider libvirt", "vagrant ssh-config"]
    );
}

#[rstest]
fn single_host_uses_inline_inventory_and_connection_vars(harness: Harness) {
    harness.script_start(&ssh_config_block("default", "127.0.0.1", 2222, "/k"));
    let mut orchestrator = harness.orchestrator();
    let request = RunRequest::new("site.yml")
        .extra_vars(vars(json!({"ansible_host": "10.0.0.99", "release": "2.1"})));

    orchestrator.run(&request).expect("run succeeds");

    let requests = harness.playbooks.requests();
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent.inventory, InventorySource::HostList(String::from("all,")));
    assert_eq!(sent.extra_vars.get("ansible_host"), Some(&json!("127.0.0.1")));
    assert_eq!(sent.extra_vars.get("ansible_port"), Some(&json!(2222)));
    assert_eq!(sent.extra_vars.get("release"), Some(&json!("2.1")));
    assert_eq!(sent.roles_path, harness.root.join("roles"));
    assert_eq!(sent.artifact_dir, harness.root.join(".artifacts"));
    assert_eq!(sent.playbook, harness.root.join("site.yml"));
}

#[rstest]
fn playbook_without_hosts_falls_back_to_synthetic_alias(harness: Harness) {
    harness.write("bare.yml", "- tasks: []\n");
    harness.script_start(&ssh_config_block("default", "127.0.0.1", 2222, "/k"));
    let mut orchestrator = harness.orchestrator();

    orchestrator
        .run(&RunRequest::new("bare.yml"))
        .expect("run succeeds");
    assert_eq!(
        harness.playbooks.requests()[0].inventory,
        InventorySource::HostList(String::from("vagrant_host,"))
    );
}

#[rstest]
fn multiple_hosts_use_generated_inventory(harness: Harness) {
    harness.script_start(&two_hosts());
    let mut orchestrator = harness.orchestrator();
    let request = RunRequest::new("site.yml")
        .extra_vars(vars(json!({"ansible_user": "root", "release": "2.1"})));

    let handles = orchestrator.run(&request).expect("run succeeds");
    assert_eq!(handles.aliases().collect::<Vec<_>>(), ["web", "db"]);

    let sent = &harness.playbooks.requests()[0];
    let InventorySource::File(path) = &sent.inventory else {
        panic!("expected generated inventory file");
    };
    let content = std::fs::read_to_string(path).expect("inventory written");
    assert!(content.starts_with("[vagrant]\n"), "content: {content}");
    assert!(content.contains("web ansible_host=127.0.0.1 ansible_port=2222"));
    assert!(content.contains("db ansible_host=127.0.0.1 ansible_port=2223"));
    assert!(!sent.extra_vars.contains_key("ansible_user"));
    assert_eq!(sent.extra_vars.get("release"), Some(&json!("2.1")));

    assert_eq!(
        orchestrator.host().expect("primary").uri(),
        "ssh://vagrant@127.0.0.1:2222"
    );
    assert_eq!(harness.handles.targets().len(), 2);
}

#[rstest]
fn target_narrows_to_one_host(harness: Harness) {
    harness.script_start(&two_hosts());
    let mut orchestrator = harness.orchestrator();

    let handles = orchestrator
        .run(&RunRequest::new("site.yml").target("db"))
        .expect("run succeeds");
    assert_eq!(handles.len(), 1);
    assert_eq!(orchestrator.host().expect("primary").port, 2223);
    assert_eq!(
        harness.playbooks.requests()[0].extra_vars.get("ansible_port"),
        Some(&json!(2223))
    );

    let err = orchestrator.get_host("web").expect_err("web was not targeted");
    let OrchestratorError::HostNotFound { alias, available } = err else {
        panic!("expected HostNotFound");
    };
    assert_eq!(alias, "web");
    assert_eq!(available, ["db"]);
}

#[rstest]
fn unknown_target_lists_available_aliases(harness: Harness) {
    harness.script_start(&two_hosts());
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator
        .run(&RunRequest::new("site.yml").target("cache"))
        .expect_err("cache is absent");
    let message = err.to_string();
    assert!(message.contains("cache"), "message: {message}");
    assert!(message.contains("web, db"), "message: {message}");
    assert!(harness.playbooks.requests().is_empty());
}

#[rstest]
fn invalid_target_block_is_a_parse_error(harness: Harness) {
    let text = format!(
        "{}Host broken\n  HostName 127.0.0.1\n  User vagrant\n  Port 2224\n",
        ssh_config_block("web", "127.0.0.1", 2222, "/keys/web")
    );
    harness.script_start(&text);
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator
        .run(&RunRequest::new("site.yml").target("broken"))
        .expect_err("broken block lacks IdentityFile");
    assert!(matches!(
        err,
        OrchestratorError::Parse(SshConfigError::MissingFields { .. })
    ));
}

#[rstest]
fn empty_ssh_config_is_a_parse_error(harness: Harness) {
    harness.script_start("");
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator
        .run(&RunRequest::new("site.yml"))
        .expect_err("no hosts");
    assert!(
        err.to_string().contains("no valid host blocks"),
        "message: {err}"
    );
}

#[rstest]
fn accessors_fail_before_any_run(harness: Harness) {
    let orchestrator = harness.orchestrator();
    assert!(matches!(orchestrator.host(), Err(OrchestratorError::NotInvoked)));
    assert!(matches!(orchestrator.hosts(), Err(OrchestratorError::NotInvoked)));
    assert!(matches!(
        orchestrator.get_host("default"),
        Err(OrchestratorError::NotInvoked)
    ));
    assert!(matches!(
        orchestrator.ssh_configs(),
        Err(OrchestratorError::NotInvoked)
    ));
    assert_eq!(orchestrator.state(), LifecycleState::Unstarted);
}

#[rstest]
fn teardown_without_control_file_is_a_no_op(harness: Harness) {
    let mut orchestrator = harness.orchestrator();
    assert!(orchestrator.teardown(ShutdownPolicy::Destroy).is_none());
    assert!(harness.runner.invocations().is_empty());
    assert_eq!(orchestrator.state(), LifecycleState::Unstarted);
}

#[rstest]
#[case(ShutdownPolicy::Destroy, Some("vagrant destroy -f"))]
#[case(ShutdownPolicy::Halt, Some("vagrant halt"))]
#[case(ShutdownPolicy::None, None)]
fn teardown_applies_policy_exactly_once(
    harness: Harness,
    #[case] policy: ShutdownPolicy,
    #[case] expected: Option<&str>,
) {
    harness.script_start(&ssh_config_block("default", "127.0.0.1", 2222, "/k"));
    harness.runner.push_success();
    let mut orchestrator = harness.orchestrator();
    orchestrator
        .run(&RunRequest::new("site.yml"))
        .expect("run succeeds");

    orchestrator.teardown(policy);
    orchestrator.teardown(policy);

    let lines = harness.runner.command_lines();
    let teardown_lines = &lines[2..];
    assert_eq!(teardown_lines, expected.as_slice());
    assert_eq!(orchestrator.state(), LifecycleState::TornDown);
}

#[rstest]
fn failed_teardown_is_not_raised(harness: Harness) {
    harness.script_start(&ssh_config_block("default", "127.0.0.1", 2222, "/k"));
    harness.runner.push_output(Some(1), "", "domain is locked");
    let mut orchestrator = harness.orchestrator();
    orchestrator
        .run(&RunRequest::new("site.yml"))
        .expect("run succeeds");

    let output = orchestrator
        .teardown(ShutdownPolicy::Destroy)
        .expect("destroy ran");
    assert_eq!(output.code, Some(1));
}

#[rstest]
fn missing_control_file_fails_before_start(harness: Harness) {
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator
        .run(&RunRequest::new("site.yml").vagrant_file("missing/Vagrantfile"))
        .expect_err("control file is absent");
    let OrchestratorError::ControlFileNotFound { path } = err else {
        panic!("expected ControlFileNotFound");
    };
    assert_eq!(path, harness.root.join("missing/Vagrantfile"));
    assert!(orchestrator.control_file().is_none());
    assert!(orchestrator.teardown(ShutdownPolicy::Destroy).is_none());
    assert!(harness.runner.invocations().is_empty());
}

#[rstest]
fn configured_control_file_beats_per_run_value(harness: Harness) {
    harness.write("vm/Vagrantfile.ci", "Vagrant.configure('2') {}\n");
    harness.script_start(&ssh_config_block("default", "127.0.0.1", 2222, "/k"));
    let settings = OrchestratorSettings {
        vagrant_file: Some(String::from("vm/Vagrantfile.ci")),
        ..OrchestratorSettings::new(harness.root.clone())
    };
    let mut orchestrator = harness.orchestrator_with(settings);

    orchestrator
        .run(&RunRequest::new("site.yml").vagrant_file("missing/Vagrantfile"))
        .expect("configured file wins");
    assert_eq!(
        orchestrator.control_file(),
        Some(harness.root.join("vm/Vagrantfile.ci").as_path())
    );
    let spec = &harness.runner.invocations()[0];
    assert_eq!(spec.env_value("VAGRANT_VAGRANTFILE"), Some("Vagrantfile.ci"));
}

#[rstest]
fn missing_playbook_fails_before_control_file(harness: Harness) {
    let mut orchestrator = harness.orchestrator();
    let err = orchestrator
        .run(&RunRequest::new("absent.yml"))
        .expect_err("playbook missing");
    assert!(matches!(err, OrchestratorError::PlaybookNotFound(_)));
    assert!(orchestrator.control_file().is_none());
}

#[rstest]
fn start_failure_leaves_environment_starting(harness: Harness) {
    harness.runner.push_output(Some(1), "", "libvirt unavailable");
    harness.runner.push_success();
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator
        .run(&RunRequest::new("site.yml"))
        .expect_err("up failed");
    assert!(matches!(err, OrchestratorError::CommandFailed { .. }));
    assert_eq!(orchestrator.state(), LifecycleState::Starting);

    orchestrator.teardown(ShutdownPolicy::Destroy);
    assert_eq!(
        harness.runner.command_lines(),
        ["vagrant up --provider libvirt", "vagrant destroy -f"]
    );
}

#[rstest]
fn missing_binaries_are_reported_together(harness: Harness) {
    harness.runner.mark_missing("ansible-playbook");
    harness.runner.mark_missing("virsh");
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator
        .run(&RunRequest::new("site.yml"))
        .expect_err("binaries missing");
    let OrchestratorError::MissingDependency { names } = err else {
        panic!("expected MissingDependency");
    };
    assert_eq!(names, ["ansible-playbook", "virsh"]);
}

#[rstest]
fn playbook_failure_carries_status_and_rc(harness: Harness) {
    harness.script_start(&ssh_config_block("default", "127.0.0.1", 2222, "/k"));
    harness.playbooks.push_outcome(PlaybookStatus::Failed, 2);
    let mut orchestrator = harness.orchestrator();

    let err = orchestrator
        .run(&RunRequest::new("site.yml"))
        .expect_err("play failed");
    assert_eq!(err.to_string(), "play failed: status=failed, rc=2");
    assert!(harness.handles.targets().is_empty());
    assert!(matches!(orchestrator.host(), Err(OrchestratorError::NotInvoked)));
}

#[rstest]
fn rerun_replaces_previous_environment(harness: Harness) {
    harness.script_start(&two_hosts());
    harness.script_start(&ssh_config_block("solo", "127.0.0.1", 2299, "/keys/solo"));
    let mut orchestrator = harness.orchestrator();

    orchestrator
        .run(&RunRequest::new("site.yml"))
        .expect("first run");
    orchestrator
        .run(&RunRequest::new("site.yml"))
        .expect("second run");

    let hosts = orchestrator.hosts().expect("handles");
    assert_eq!(hosts.aliases().collect::<Vec<_>>(), ["solo"]);
    let descriptors = orchestrator.ssh_configs().expect("descriptors");
    assert!(!descriptors.contains("web"));
}

#[rstest]
fn caller_inventory_is_used_verbatim(harness: Harness) {
    harness.write("inventory/hosts.ini", "[all]\nvm\n");
    harness.script_start(&ssh_config_block("default", "127.0.0.1", 2222, "/k"));
    let mut orchestrator = harness.orchestrator();

    orchestrator
        .run(&RunRequest::new("site.yml").inventory("inventory/hosts.ini"))
        .expect("run succeeds");
    let sent = &harness.playbooks.requests()[0];
    assert_eq!(
        sent.inventory,
        InventorySource::File(harness.root.join("inventory/hosts.ini"))
    );
    assert_eq!(sent.extra_vars.get("ansible_port"), Some(&json!(2222)));
}

#[rstest]
fn configured_artifact_dir_wins(harness: Harness) {
    harness.script_start(&two_hosts());
    let settings = OrchestratorSettings {
        artifact_dir: Some(String::from("build/artifacts")),
        ..OrchestratorSettings::new(harness.root.clone())
    };
    let mut orchestrator = harness.orchestrator_with(settings);

    orchestrator
        .run(&RunRequest::new("site.yml").artifact_dir("ignored"))
        .expect("run succeeds");
    let sent = &harness.playbooks.requests()[0];
    assert_eq!(sent.artifact_dir, harness.root.join("build/artifacts"));
    assert!(harness.root.join("build/artifacts/vagrant-inventory.ini").is_file());
}

#[rstest]
fn invalid_layout_is_rejected_at_construction() {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 path");
    let result = LifecycleOrchestrator::new(
        OrchestratorSettings::new(root),
        VagrantCli::new(VagrantSettings::default(), ScriptedRunner::new()),
        RecordingPlaybookRunner::new(),
        RecordingHandleFactory::new(),
    );
    let Err(err) = result else {
        panic!("layout should be rejected");
    };
    assert!(matches!(err, OrchestratorError::StructuralLayout(_)));
}

#[rstest]
fn fixture_tears_down_on_drop(harness: Harness) {
    harness.script_start(&ssh_config_block("default", "127.0.0.1", 2222, "/k"));
    harness.runner.push_success();
    {
        let mut fixture = VagrantFixture::new(harness.orchestrator(), ShutdownPolicy::Halt);
        fixture
            .run(&RunRequest::new("site.yml"))
            .expect("run succeeds");
        assert_eq!(fixture.policy(), ShutdownPolicy::Halt);
    }
    assert_eq!(
        harness.runner.command_lines().last().map(String::as_str),
        Some("vagrant halt")
    );
}

#[rstest]
fn attach_enables_teardown_of_existing_environment(harness: Harness) {
    harness.runner.push_success();
    let mut orchestrator = harness.orchestrator();

    let control_file = orchestrator.attach(None).expect("control file exists");
    assert_eq!(control_file, harness.root.join("Vagrantfile"));

    orchestrator.teardown(ShutdownPolicy::Destroy);
    assert_eq!(harness.runner.command_lines(), ["vagrant destroy -f"]);
    assert!(matches!(
        orchestrator.hosts(),
        Err(OrchestratorError::NotInvoked)
    ));
}

#[rstest]
fn attach_rejects_missing_control_file(harness: Harness) {
    let mut orchestrator = harness.orchestrator();
    let err = orchestrator
        .attach(Some("machines/Vagrantfile"))
        .expect_err("control file absent");
    assert!(matches!(err, OrchestratorError::ControlFileNotFound { .. }));
    assert!(orchestrator.teardown(ShutdownPolicy::Destroy).is_none());
}

fn harness_config(project_dir: Option<&str>) -> HarnessConfig {
    HarnessConfig {
        project_dir: project_dir.map(str::to_owned),
        vagrant_file: None,
        artifact_dir: None,
        shutdown: String::from("destroy"),
        provider: String::from(crate::vagrant::DEFAULT_BACKEND),
        vagrant_bin: String::from("vagrant"),
        ansible_playbook_bin: String::from("ansible-playbook"),
        ssh_bin: String::from("ssh"),
    }
}

#[rstest]
#[case(None, "/work/role/tests/integration", "/work/role")]
#[case(None, "/work/role", "/work/role")]
#[case(Some("/pinned"), "/work/role/tests", "/pinned")]
fn settings_infer_root_from_working_dir(
    #[case] configured: Option<&str>,
    #[case] working_dir: &str,
    #[case] expected: &str,
) {
    let settings =
        OrchestratorSettings::from_config(&harness_config(configured), Utf8Path::new(working_dir));
    assert_eq!(settings.project_dir, Utf8Path::new(expected));
}

#[rstest]
fn from_config_accepts_nested_tests_directory(harness: Harness) {
    let nested = harness.root.join("tests/integration");
    std::fs::create_dir_all(&nested).expect("nested tests dir");

    let orchestrator = VagrantOrchestrator::from_config(&harness_config(None), &nested)
        .expect("root is inferred from the tests directory");
    assert_eq!(orchestrator.layout.root(), harness.root);
}
