//! Whole-state consistency checks.
//!
//! After any sequence of successful operations a state must satisfy:
//! - every index table matches a fresh projection of its bucket
//! - each list operation returns exactly the ids stored in the bucket
//! - every target's project exists and lists it, and every listed target
//!   exists and points back at the project listing it

use berth_core::{DurableRead, Entity, IndexDrift, Project, Reference, State, Target};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One broken consistency rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Index and bucket disagree.
    Drift(IndexDrift),
    /// A list operation disagrees with the bucket.
    ListMismatch {
        /// Entity kind.
        kind: &'static str,
        /// Ids the list operation returned.
        listed: Vec<String>,
        /// Ids stored in the bucket.
        stored: Vec<String>,
    },
    /// A target's project does not exist.
    MissingParent {
        /// Target id.
        target: String,
        /// Project id the target names.
        project: String,
    },
    /// A target's project does not list it.
    Unlisted {
        /// Target id.
        target: String,
        /// Project id.
        project: String,
    },
    /// A project lists a target that does not exist or belongs elsewhere.
    Dangling {
        /// Project id.
        project: String,
        /// Listed target id.
        target: String,
    },
    /// A project lists the same target twice.
    Duplicate {
        /// Project id.
        project: String,
        /// Target id.
        target: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drift(drift) => write!(f, "index drift: {drift:?}"),
            Self::ListMismatch {
                kind,
                listed,
                stored,
            } => write!(f, "{kind} list {listed:?} != stored {stored:?}"),
            Self::MissingParent { target, project } => {
                write!(f, "target {target} names missing project {project}")
            }
            Self::Unlisted { target, project } => {
                write!(f, "target {target} not listed by project {project}")
            }
            Self::Dangling { project, target } => {
                write!(f, "project {project} lists foreign or missing target {target}")
            }
            Self::Duplicate { project, target } => {
                write!(f, "project {project} lists target {target} twice")
            }
        }
    }
}

/// Decodes every record of kind `E`, keyed by resource id.
pub fn stored<E: Entity>(state: &State) -> BTreeMap<String, E> {
    state
        .durable()
        .view(|txn| {
            let mut out = BTreeMap::new();
            txn.for_each(E::BUCKET, &mut |key, value| {
                let record: E =
                    berth_codec::decode(value).expect("Failed to decode stored record");
                out.insert(String::from_utf8_lossy(key).into_owned(), record);
                Ok(())
            })?;
            Ok(out)
        })
        .expect("Failed to read bucket")
}

fn check_list<E: Entity>(
    state: &State,
    stored: &BTreeMap<String, E>,
    violations: &mut Vec<Violation>,
) {
    let listed: Vec<String> = state
        .list::<E>()
        .expect("Failed to list")
        .iter()
        .map(|r| r.resource_id().to_string())
        .collect();
    let stored: Vec<String> = stored.keys().cloned().collect();
    if listed != stored {
        violations.push(Violation::ListMismatch {
            kind: E::KIND,
            listed,
            stored,
        });
    }
}

/// Collects every violation in `state`.
pub fn check(state: &State) -> Vec<Violation> {
    let mut violations: Vec<Violation> = state
        .verify_indexes()
        .expect("Failed to verify indexes")
        .into_iter()
        .map(Violation::Drift)
        .collect();

    let projects = stored::<Project>(state);
    let targets = stored::<Target>(state);
    check_list(state, &projects, &mut violations);
    check_list(state, &targets, &mut violations);

    for (id, target) in &targets {
        let project_id = target
            .project
            .as_ref()
            .map(|p| p.resource_id.clone())
            .unwrap_or_default();
        match projects.get(&project_id) {
            None => violations.push(Violation::MissingParent {
                target: id.clone(),
                project: project_id,
            }),
            Some(project) if !project.targets.iter().any(|t| &t.resource_id == id) => {
                violations.push(Violation::Unlisted {
                    target: id.clone(),
                    project: project_id,
                });
            }
            Some(_) => {}
        }
    }

    for (id, project) in &projects {
        let mut seen = BTreeSet::new();
        for listed in &project.targets {
            if !seen.insert(listed.resource_id.as_str()) {
                violations.push(Violation::Duplicate {
                    project: id.clone(),
                    target: listed.resource_id.clone(),
                });
            }
            let owned = targets
                .get(&listed.resource_id)
                .and_then(|t| t.project.as_ref())
                .is_some_and(|p| &p.resource_id == id);
            if !owned {
                violations.push(Violation::Dangling {
                    project: id.clone(),
                    target: listed.resource_id.clone(),
                });
            }
        }
    }

    violations
}

/// Panics with every violation in `state`.
pub fn assert_consistent(state: &State) {
    let violations = check(state);
    if !violations.is_empty() {
        let report: Vec<String> = violations.iter().map(ToString::to_string).collect();
        panic!("state is inconsistent:\n  {}", report.join("\n  "));
    }
}
