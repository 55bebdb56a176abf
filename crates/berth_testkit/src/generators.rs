//! Property-based test generators using proptest.
//!
//! Provides strategies for records and for whole sequences of state
//! operations that can be replayed against a [`State`].

use berth_core::{Project, State, StateResult, Target, TargetRef, TargetState};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for record names. Mixed case so lowercase lookups get exercised.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9-]{0,11}").expect("Invalid regex")
}

/// Strategy for a small pool of names, so name collisions are common.
pub fn colliding_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["web", "Web", "db", "cache", "worker"]).prop_map(String::from)
}

/// Strategy for target states.
pub fn target_state_strategy() -> impl Strategy<Value = TargetState> {
    prop_oneof![
        Just(TargetState::Unknown),
        Just(TargetState::NotCreated),
        Just(TargetState::Pending),
        Just(TargetState::Running),
        Just(TargetState::Stopped),
        Just(TargetState::Destroyed),
    ]
}

/// Strategy for target labels.
pub fn labels_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        prop::string::string_regex("[a-z0-9]{0,8}").expect("Invalid regex"),
        0..4,
    )
}

/// Strategy for opaque target configuration.
pub fn configuration_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// One step against a [`State`].
///
/// Slots pick among the records that exist when the step runs, modulo
/// their count. A step whose slot has nothing to pick from is a no-op.
#[derive(Debug, Clone)]
pub enum Op {
    /// Create a project.
    PutProject {
        /// Project name.
        name: String,
    },
    /// Rename a project.
    RenameProject {
        /// Project slot.
        slot: usize,
        /// New name.
        name: String,
    },
    /// Delete a project and its targets.
    DeleteProject {
        /// Project slot.
        slot: usize,
    },
    /// Create a target in a project.
    PutTarget {
        /// Project slot.
        project: usize,
        /// Target name.
        name: String,
        /// Initial state.
        state: TargetState,
        /// Labels.
        labels: BTreeMap<String, String>,
        /// Configuration bytes.
        configuration: Vec<u8>,
    },
    /// Change a target's state.
    UpdateTarget {
        /// Target slot.
        slot: usize,
        /// New state.
        state: TargetState,
    },
    /// Move a target to another project.
    MoveTarget {
        /// Target slot.
        slot: usize,
        /// Project slot.
        project: usize,
    },
    /// Delete a target.
    DeleteTarget {
        /// Target slot.
        slot: usize,
    },
    /// Delete a target through a reference naming any project, which need
    /// not be the one that owns it.
    DeleteTargetVia {
        /// Target slot.
        slot: usize,
        /// Project slot.
        project: usize,
    },
}

impl Op {
    /// Runs the step. Returns whether it changed anything.
    pub fn apply(&self, state: &State) -> StateResult<bool> {
        let projects = state.project_list()?;
        let targets = state.target_list()?;

        match self {
            Op::PutProject { name } => {
                state.project_put(Project::new(name.clone(), format!("/work/{name}")))?;
            }
            Op::RenameProject { slot, name } => {
                let Some(reference) = pick(&projects, *slot) else {
                    return Ok(false);
                };
                let mut project = state.project_get(reference)?;
                project.name.clone_from(name);
                state.project_put(project)?;
            }
            Op::DeleteProject { slot } => {
                let Some(reference) = pick(&projects, *slot) else {
                    return Ok(false);
                };
                state.project_delete(reference)?;
            }
            Op::PutTarget {
                project,
                name,
                state: target_state,
                labels,
                configuration,
            } => {
                let Some(reference) = pick(&projects, *project) else {
                    return Ok(false);
                };
                let mut target = Target::new(name.clone(), reference.clone());
                target.state = *target_state;
                target.labels.clone_from(labels);
                target.configuration.clone_from(configuration);
                state.target_put(target)?;
            }
            Op::UpdateTarget {
                slot,
                state: target_state,
            } => {
                let Some(reference) = pick(&targets, *slot) else {
                    return Ok(false);
                };
                let mut target = state.target_get(reference)?;
                target.state = *target_state;
                state.target_put(target)?;
            }
            Op::MoveTarget { slot, project } => {
                let (Some(reference), Some(project)) =
                    (pick(&targets, *slot), pick(&projects, *project))
                else {
                    return Ok(false);
                };
                let mut target = state.target_get(reference)?;
                target.project = Some(project.clone());
                state.target_put(target)?;
            }
            Op::DeleteTarget { slot } => {
                let Some(reference) = pick(&targets, *slot) else {
                    return Ok(false);
                };
                state.target_delete(reference)?;
            }
            Op::DeleteTargetVia { slot, project } => {
                let (Some(target), Some(project)) =
                    (pick(&targets, *slot), pick(&projects, *project))
                else {
                    return Ok(false);
                };
                state.target_delete(&TargetRef::new(&target.resource_id, project.clone()))?;
            }
        }
        Ok(true)
    }
}

fn pick<T>(items: &[T], slot: usize) -> Option<&T> {
    if items.is_empty() {
        None
    } else {
        items.get(slot % items.len())
    }
}

/// Strategy for a single [`Op`].
pub fn op_strategy() -> impl Strategy<Value = Op> {
    let slot = 0usize..16;
    prop_oneof![
        3 => name_strategy().prop_map(|name| Op::PutProject { name }),
        1 => (slot.clone(), name_strategy())
            .prop_map(|(slot, name)| Op::RenameProject { slot, name }),
        1 => slot.clone().prop_map(|slot| Op::DeleteProject { slot }),
        5 => (
            slot.clone(),
            colliding_name_strategy(),
            target_state_strategy(),
            labels_strategy(),
            configuration_strategy(),
        )
            .prop_map(|(project, name, state, labels, configuration)| Op::PutTarget {
                project,
                name,
                state,
                labels,
                configuration,
            }),
        2 => (slot.clone(), target_state_strategy())
            .prop_map(|(slot, state)| Op::UpdateTarget { slot, state }),
        1 => (slot.clone(), slot.clone())
            .prop_map(|(slot, project)| Op::MoveTarget { slot, project }),
        2 => slot.clone().prop_map(|slot| Op::DeleteTarget { slot }),
        1 => (slot.clone(), slot)
            .prop_map(|(slot, project)| Op::DeleteTargetVia { slot, project }),
    ]
}

/// Strategy for a sequence of up to `max_len` ops.
pub fn ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn names_are_never_empty(name in name_strategy()) {
            prop_assert!(!name.is_empty());
        }

        #[test]
        fn ops_apply_on_fresh_state(ops in ops_strategy(8)) {
            let state = State::open_in_memory().unwrap();
            for op in &ops {
                op.apply(&state).unwrap();
            }
        }
    }

    #[test]
    fn slot_ops_on_empty_state_are_noops() {
        let state = State::open_in_memory().unwrap();
        assert!(!Op::DeleteProject { slot: 3 }.apply(&state).unwrap());
        assert!(!Op::DeleteTarget { slot: 0 }.apply(&state).unwrap());
        assert!(Op::PutProject { name: "a".into() }.apply(&state).unwrap());
        assert!(!Op::MoveTarget { slot: 0, project: 0 }.apply(&state).unwrap());
        assert!(!Op::DeleteTargetVia { slot: 0, project: 0 }.apply(&state).unwrap());
    }

    #[test]
    fn delete_via_another_project_removes_the_target() {
        let state = State::open_in_memory().unwrap();
        Op::PutProject { name: "a".into() }.apply(&state).unwrap();
        Op::PutProject { name: "b".into() }.apply(&state).unwrap();
        let projects = state.project_list().unwrap();
        let owner = projects.iter().position(|p| p.name == "a").unwrap();
        let other = projects.iter().position(|p| p.name == "b").unwrap();
        Op::PutTarget {
            project: owner,
            name: "web".into(),
            state: TargetState::Running,
            labels: BTreeMap::new(),
            configuration: Vec::new(),
        }
        .apply(&state)
        .unwrap();

        assert!(Op::DeleteTargetVia { slot: 0, project: other }.apply(&state).unwrap());
        assert!(state.target_list().unwrap().is_empty());
        for project in &projects {
            assert!(state.project_get(project).unwrap().targets.is_empty());
        }
        assert!(state.verify_indexes().unwrap().is_empty());
    }
}
