//! Randomized convergence checks

use proptest::prelude::*;
use strata_core::{TransactionConfig, TransactionManager};
use strata_model::{EntityId, Model, RepositoryId, Value};
use strata_test_utils::{assert_converged, init_tracing, manager_with_clone};

#[derive(Debug, Clone)]
enum Op {
    AddTrack,
    AddNote(usize, i64),
    SetPitch(usize, i64),
    Rename(usize, u8),
    Tie(usize, usize),
    ClearTie(usize),
    Solo(usize),
    AddMarker(usize, u8),
    AddAccent(usize, usize),
    RemoveNote(usize),
    RemoveMarker(usize),
    RemoveTrack(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::AddTrack),
        5 => (any::<usize>(), 0i64..128).prop_map(|(t, p)| Op::AddNote(t, p)),
        4 => (any::<usize>(), 0i64..4).prop_map(|(n, p)| Op::SetPitch(n, p)),
        2 => (any::<usize>(), 0u8..3).prop_map(|(t, n)| Op::Rename(t, n)),
        3 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Tie(a, b)),
        1 => any::<usize>().prop_map(Op::ClearTie),
        1 => any::<usize>().prop_map(Op::Solo),
        2 => (any::<usize>(), 0u8..3).prop_map(|(t, k)| Op::AddMarker(t, k)),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(t, n)| Op::AddAccent(t, n)),
        2 => any::<usize>().prop_map(Op::RemoveNote),
        1 => any::<usize>().prop_map(Op::RemoveMarker),
        1 => any::<usize>().prop_map(Op::RemoveTrack),
    ]
}

#[derive(Debug, Clone)]
enum Step {
    Edit(bool, Op),
    Commit(bool),
    Pull(bool),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        8 => (any::<bool>(), op()).prop_map(|(side, op)| Step::Edit(side, op)),
        1 => any::<bool>().prop_map(Step::Commit),
        1 => any::<bool>().prop_map(Step::Pull),
    ]
}

fn of_type(m: &Model, type_name: &str) -> Vec<EntityId> {
    m.walk(m.root())
        .unwrap()
        .into_iter()
        .filter(|&e| m.type_name(e).unwrap() == type_name)
        .collect()
}

fn pick(entities: &[EntityId], i: usize) -> Option<EntityId> {
    (!entities.is_empty()).then(|| entities[i % entities.len()])
}

fn apply(m: &mut Model, op: &Op) {
    let tracks = of_type(m, "Track");
    let notes = of_type(m, "Note");
    match *op {
        Op::AddTrack => {
            let root = m.root();
            m.create_indexed_child(root, "Track").unwrap();
        }
        Op::AddNote(t, pitch) => {
            if let Some(track) = pick(&tracks, t) {
                let note = m.create_child(track, "Note").unwrap();
                m.set(note, "pitch", pitch).unwrap();
            }
        }
        Op::SetPitch(n, pitch) => {
            if let Some(note) = pick(&notes, n) {
                m.set(note, "pitch", pitch).unwrap();
            }
        }
        Op::Rename(t, name) => {
            if let Some(track) = pick(&tracks, t) {
                m.set(track, "name", format!("t{name}")).unwrap();
            }
        }
        Op::Tie(a, b) => {
            if let (Some(a), Some(b)) = (pick(&notes, a), pick(&notes, b)) {
                m.set_reference(a, "tie", Some(b)).unwrap();
            }
        }
        Op::ClearTie(n) => {
            if let Some(note) = pick(&notes, n) {
                m.set_reference(note, "tie", None).unwrap();
            }
        }
        Op::Solo(t) => {
            let root = m.root();
            m.set_reference(root, "solo", pick(&tracks, t)).unwrap();
        }
        Op::AddMarker(t, key) => {
            if let Some(track) = pick(&tracks, t) {
                // Taken keys are rejected without side effects
                if let Ok(marker) = m.create_keyed_child(track, "Marker", Value::from(format!("k{key}"))) {
                    m.set(marker, "label", "x").unwrap();
                }
            }
        }
        Op::AddAccent(t, n) => {
            if let Some(track) = pick(&tracks, t) {
                let own = m.children(track, "notes").unwrap();
                if let Some(note) = pick(&own, n) {
                    if let Ok(accent) = m.create_keyed_child(track, "Accent", note) {
                        m.set(accent, "strength", 1).unwrap();
                    }
                }
            }
        }
        Op::RemoveNote(n) => {
            if let Some(note) = pick(&notes, n) {
                m.remove(note).unwrap();
            }
        }
        Op::RemoveMarker(i) => {
            let markers = of_type(m, "Marker");
            if let Some(marker) = pick(&markers, i) {
                m.remove(marker).unwrap();
            }
        }
        Op::RemoveTrack(t) => {
            if let Some(track) = pick(&tracks, t) {
                m.remove(track).unwrap();
            }
        }
    }
}

fn edit(manager: &TransactionManager, repo: RepositoryId, op: &Op) {
    manager.with_model_mut(repo, |m| apply(m, op)).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_commit_then_pull_converges(ops in proptest::collection::vec(op(), 0..40)) {
        init_tracing();
        let (manager, origin, copy) = manager_with_clone(TransactionConfig::new());
        for op in &ops {
            edit(&manager, origin, op);
        }
        manager.commit(origin).unwrap();
        manager.pull(copy).unwrap();
        assert_converged(&manager, origin, copy);

        let late = manager.clone_repository(copy).unwrap();
        assert_converged(&manager, origin, late);
    }

    #[test]
    fn prop_concurrent_edits_converge(steps in proptest::collection::vec(step(), 0..60)) {
        let (manager, origin, copy) = manager_with_clone(TransactionConfig::new());
        let side = |copy_side: bool| if copy_side { copy } else { origin };
        for step in &steps {
            match step {
                Step::Edit(s, op) => edit(&manager, side(*s), op),
                Step::Commit(s) => {
                    manager.commit(side(*s)).unwrap();
                }
                Step::Pull(s) => {
                    manager.pull(side(*s)).unwrap();
                }
            }
        }
        manager.commit(copy).unwrap();
        manager.commit(origin).unwrap();
        manager.pull(copy).unwrap();
        assert_converged(&manager, origin, copy);
    }

    #[test]
    fn prop_log_ids_strictly_increase(sides in proptest::collection::vec(any::<bool>(), 1..20)) {
        let config = TransactionConfig::new().without_garbage_collection();
        let (manager, origin, copy) = manager_with_clone(config);
        let mut published = Vec::new();
        for copy_side in sides {
            let repo = if copy_side { copy } else { origin };
            edit(&manager, repo, &Op::AddTrack);
            published.push(manager.commit(repo).unwrap().unwrap().id());
        }
        let log: Vec<_> = manager.log_snapshot().iter().map(|c| c.id()).collect();
        prop_assert_eq!(&log, &published);
        prop_assert!(log.windows(2).all(|w| w[0] < w[1]));
    }
}
