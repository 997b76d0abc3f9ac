//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ansible::{
    PlaybookError, PlaybookOutcome, PlaybookRequest, PlaybookRunner, PlaybookStatus,
};
use crate::process::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use crate::remote::{HandleError, HandleFactory, SshTarget};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Every binary is reported as available unless marked missing.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandSpec>>>,
    missing: Rc<RefCell<Vec<String>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.invocations.borrow().clone()
    }

    /// Returns the recorded invocations rendered as command lines.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(CommandSpec::command_line)
            .collect()
    }

    /// Reports `program` as absent from the host.
    pub fn mark_missing(&self, program: impl Into<String>) {
        let name = program.into();
        let mut missing = self.missing.borrow_mut();
        if !missing.contains(&name) {
            missing.push(name);
        }
    }

    /// Number of queued responses not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.responses.borrow().len()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.invocations.borrow_mut().push(spec.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: spec.program.clone(),
                message: String::from("no scripted response available"),
            })
    }

    fn is_available(&self, program: &str) -> bool {
        !self.missing.borrow().iter().any(|name| name == program)
    }
}

/// Renders one `vagrant ssh-config` host block.
#[must_use]
pub fn ssh_config_block(alias: &str, hostname: &str, port: u16, identity_file: &str) -> String {
    format!(
        "Host {alias}\n  HostName {hostname}\n  User vagrant\n  Port {port}\n  UserKnownHostsFile /dev/null\n  StrictHostKeyChecking no\n  PasswordAuthentication no\n  IdentityFile {identity_file}\n  IdentitiesOnly yes\n  LogLevel FATAL\n\n"
    )
}

/// Playbook runner fake that records requests and replays outcomes.
///
/// Runs succeed unless an outcome has been queued.
#[derive(Clone, Debug, Default)]
pub struct RecordingPlaybookRunner {
    outcomes: Rc<RefCell<VecDeque<(PlaybookStatus, i32)>>>,
    requests: Rc<RefCell<Vec<PlaybookRequest>>>,
}

impl RecordingPlaybookRunner {
    /// Creates a runner that succeeds by default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the status and return code for the next run.
    pub fn push_outcome(&self, status: PlaybookStatus, rc: i32) {
        self.outcomes.borrow_mut().push_back((status, rc));
    }

    /// Returns a snapshot of all requests recorded so far.
    #[must_use]
    pub fn requests(&self) -> Vec<PlaybookRequest> {
        self.requests.borrow().clone()
    }
}

impl PlaybookRunner for RecordingPlaybookRunner {
    fn run(&self, request: &PlaybookRequest) -> Result<PlaybookOutcome, PlaybookError> {
        self.requests.borrow_mut().push(request.clone());
        let (status, rc) = self
            .outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or((PlaybookStatus::Successful, 0));
        Ok(PlaybookOutcome {
            status,
            rc,
            artifacts: request.artifact_dir.clone(),
        })
    }
}

/// Handle factory fake whose handles are the targets themselves.
#[derive(Clone, Debug, Default)]
pub struct RecordingHandleFactory {
    targets: Rc<RefCell<Vec<SshTarget>>>,
}

impl RecordingHandleFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every target a handle was built for.
    #[must_use]
    pub fn targets(&self) -> Vec<SshTarget> {
        self.targets.borrow().clone()
    }
}

impl HandleFactory for RecordingHandleFactory {
    type Handle = SshTarget;

    fn connect(&self, target: &SshTarget) -> Result<Self::Handle, HandleError> {
        self.targets.borrow_mut().push(target.clone());
        Ok(target.clone())
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    #[must_use]
    pub fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
