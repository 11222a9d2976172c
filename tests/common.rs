//! Test utilities & fixtures.
//! Provides access to integration test data under `tests/test-data-int` and a scripted
//! stand-in for the `meshtastic` CLI.
#![allow(dead_code)] // Each test binary uses a different subset.

use async_trait::async_trait;
use meshbridge::config::Config;
use meshbridge::meshtastic::{ActionError, ActionRunner};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Return the path to the static integration test fixture directory.
pub fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("test-data-int")
}

/// Captured `meshtastic --nodes` output with four rows (one without an id).
pub fn nodes_output() -> String {
    std::fs::read_to_string(fixture_root().join("nodes_output.txt")).expect("fixture")
}

/// Config suitable for driving the server in tests: millisecond retry delay, snapshot in
/// `dir`, chats 0 and 1.
pub fn test_config(dir: &Path) -> Config {
    let mut cfg = Config::from_toml(
        r#"
[device]
host = "10.0.0.5"

[retry]
max_retries = 10
delay_secs = 0

[[chats]]
index = 0
name = "Default"

[[chats]]
index = 1
name = "Local"

[logging]
level = "error"
"#,
    )
    .expect("test config");
    cfg.storage.state_file = dir.join("state.json").to_string_lossy().into_owned();
    cfg
}

/// Replays scripted results, then repeats `fallback` forever. Records every argv.
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Result<String, ActionError>>>,
    fallback: Result<String, ActionError>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new(
        script: Vec<Result<String, ActionError>>,
        fallback: Result<String, ActionError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(result: Result<String, ActionError>) -> Self {
        Self::new(Vec::new(), result)
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionRunner for ScriptedRunner {
    async fn run(&self, args: &[String]) -> Result<String, ActionError> {
        self.calls.lock().unwrap().push(args.to_vec());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn unreachable() -> ActionError {
    ActionError::ExitStatus {
        code: Some(1),
        stderr: "Error connecting to 10.0.0.5".into(),
    }
}
