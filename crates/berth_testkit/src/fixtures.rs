//! Test fixtures and state helpers.

use berth_core::{
    Config, Entity, IdGenerator, Project, ProjectRef, SchemaRegistry, State, StateResult, Target,
};
use berth_storage::InMemoryBackend;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output to the test harness, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Hands out `prj-001`, `tgt-001`, ... per kind, so tests can predict ids.
#[derive(Debug, Default)]
pub struct SequentialIds {
    counters: Mutex<HashMap<&'static str, u64>>,
}

impl SequentialIds {
    /// Starts every kind at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues after the highest number seen in `state`, for reopened stores.
    ///
    /// Numbers of records deleted before the reopen can come round again.
    pub fn resume(state: &State) -> Self {
        let ids = Self::new();
        {
            let mut counters = ids.counters.lock().expect("poisoned id counter");
            let refs = state
                .project_list()
                .expect("list projects")
                .into_iter()
                .map(|p| (Project::KIND, p.resource_id))
                .chain(
                    state
                        .target_list()
                        .expect("list targets")
                        .into_iter()
                        .map(|t| (Target::KIND, t.resource_id)),
                );
            for (kind, id) in refs {
                let n = id
                    .rsplit('-')
                    .next()
                    .and_then(|n| n.parse::<u64>().ok())
                    .unwrap_or(0);
                let counter = counters.entry(kind).or_insert(0);
                *counter = (*counter).max(n);
            }
        }
        ids
    }
}

fn prefix(kind: &str) -> &str {
    match kind {
        "Project" => "prj",
        "Target" => "tgt",
        other => other,
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self, kind: &'static str) -> StateResult<String> {
        let mut counters = self.counters.lock().expect("poisoned id counter");
        let counter = counters.entry(kind).or_insert(0);
        *counter += 1;
        Ok(format!("{}-{:03}", prefix(kind), counter))
    }
}

/// A test state with automatic cleanup.
///
/// Memory-backed states keep a handle on their backend and file-backed
/// ones keep their directory, so either can be reopened to simulate a
/// process restart.
pub struct TestState {
    /// The state instance.
    pub state: State,
    backend: Option<InMemoryBackend>,
    temp_dir: Option<TempDir>,
}

impl TestState {
    /// A memory-backed state with sequential ids.
    pub fn memory() -> Self {
        let backend = InMemoryBackend::new();
        let state = open_backend(&backend).with_id_generator(SequentialIds::new());
        Self {
            state,
            backend: Some(backend),
            temp_dir: None,
        }
    }

    /// A file-backed state in a temporary directory, with sequential ids.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let state = State::open(temp_dir.path().join("state"), Config::default())
            .expect("Failed to open file state")
            .with_id_generator(SequentialIds::new());
        Self {
            state,
            backend: None,
            temp_dir: Some(temp_dir),
        }
    }

    /// Directory of a file-backed state.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("state"))
    }

    /// The backend of a memory-backed state.
    pub fn backend(&self) -> Option<&InMemoryBackend> {
        self.backend.as_ref()
    }

    /// Drops the state and opens it again over the same bytes.
    pub fn reopen(self) -> Self {
        let Self {
            state,
            backend,
            temp_dir,
        } = self;
        drop(state);

        let state = match (&backend, &temp_dir) {
            (Some(backend), _) => open_backend(backend),
            (None, Some(dir)) => State::open(dir.path().join("state"), Config::default())
                .expect("Failed to reopen file state"),
            (None, None) => unreachable!("test state without storage"),
        };
        let ids = SequentialIds::resume(&state);
        Self {
            state: state.with_id_generator(ids),
            backend,
            temp_dir,
        }
    }
}

fn open_backend(backend: &InMemoryBackend) -> State {
    State::open_with_backend(
        Box::new(backend.share()),
        Config::default(),
        SchemaRegistry::standard(),
    )
    .expect("Failed to open in-memory state")
}

impl std::ops::Deref for TestState {
    type Target = State;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

/// Runs a test with a memory-backed state.
pub fn with_temp_state<F, R>(f: F) -> R
where
    F: FnOnce(&State) -> R,
{
    let test_state = TestState::memory();
    f(&test_state.state)
}

/// Runs a test with a file-backed state and its directory.
pub fn with_file_state<F, R>(f: F) -> R
where
    F: FnOnce(&State, &Path) -> R,
{
    let test_state = TestState::file();
    let path = test_state.path().expect("file state has a path");
    f(&test_state.state, &path)
}

/// Common scenarios.
pub mod scenarios {
    use super::*;

    /// Stores a project named `name`.
    pub fn project(state: &State, name: &str) -> Project {
        state
            .project_put(Project::new(name, format!("/work/{name}")))
            .expect("Failed to put project")
    }

    /// Stores a target named `name` in `project`.
    pub fn target(state: &State, project: &ProjectRef, name: &str) -> Target {
        state
            .target_put(Target::new(name, project.clone()))
            .expect("Failed to put target")
    }

    /// Stores a project with `count` targets named `target-0`, `target-1`, ...
    pub fn project_with_targets(state: &State, name: &str, count: usize) -> (Project, Vec<Target>) {
        let project = project(state, name);
        let targets = (0..count)
            .map(|i| target(state, &project.to_ref(), &format!("target-{i}")))
            .collect();
        let project = state
            .project_get(&project.to_ref())
            .expect("Failed to reload project");
        (project, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_per_kind() {
        let ids = SequentialIds::new();
        assert_eq!(ids.generate("Project").unwrap(), "prj-001");
        assert_eq!(ids.generate("Target").unwrap(), "tgt-001");
        assert_eq!(ids.generate("Target").unwrap(), "tgt-002");
    }

    #[test]
    fn memory_state_reopens() {
        let test_state = TestState::memory();
        let (project, _) = scenarios::project_with_targets(&test_state, "demo", 2);
        assert_eq!(project.resource_id, "prj-001");

        let test_state = test_state.reopen();
        assert_eq!(test_state.target_list().unwrap().len(), 2);
        let next = scenarios::target(&test_state, &project.to_ref(), "extra");
        assert_eq!(next.resource_id, "tgt-003");
    }

    #[test]
    fn file_state_reopens() {
        let test_state = TestState::file();
        scenarios::project(&test_state, "demo");
        let test_state = test_state.reopen();
        assert_eq!(test_state.project_list().unwrap().len(), 1);
    }
}
