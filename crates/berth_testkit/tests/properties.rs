//! Property tests over random operation sequences.

use berth_core::{Config, SchemaRegistry, State};
use berth_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn op_sequences_keep_state_consistent(ops in ops_strategy(40)) {
        let state = TestState::memory();
        for op in &ops {
            op.apply(&state).unwrap();
        }
        let violations = check(&state);
        prop_assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn rebuild_is_idempotent(ops in ops_strategy(24)) {
        let state = TestState::memory();
        for op in &ops {
            op.apply(&state).unwrap();
        }
        let first = state.rebuild_indexes().unwrap();
        let projects = state.project_list().unwrap();
        let targets = state.target_list().unwrap();

        let second = state.rebuild_indexes().unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(state.project_list().unwrap(), projects);
        prop_assert_eq!(state.target_list().unwrap(), targets);
        prop_assert!(state.verify_indexes().unwrap().is_empty());
    }

    #[test]
    fn reopen_sees_every_committed_op(ops in ops_strategy(24)) {
        let state = TestState::memory();
        for op in &ops {
            op.apply(&state).unwrap();
        }
        let projects = state.project_list().unwrap();
        let targets = state.target_list().unwrap();
        let backend = state.backend().unwrap().share();

        let reopened = State::open_with_backend(
            Box::new(backend),
            Config::default(),
            SchemaRegistry::standard(),
        )
        .unwrap();
        prop_assert_eq!(reopened.project_list().unwrap(), projects);
        prop_assert_eq!(reopened.target_list().unwrap(), targets);
        assert_consistent(&reopened);
    }

    #[test]
    fn find_by_name_is_case_insensitive(name in name_strategy()) {
        let state = TestState::memory();
        let project = scenarios::project(&state, &name);
        let found = state
            .project_find(&berth_core::Project {
                name: name.to_uppercase(),
                ..Default::default()
            })
            .unwrap();
        prop_assert_eq!(found.resource_id, project.resource_id);
    }
}
