mod common;

use std::sync::Arc;
use std::thread;

use common::{has_double_suffix, seed_panel_repeater};
use ramify_common::{Node, NodeKind};
use ramify_store::{DuplicationSession, MemoryBackend, NodeStore, RepeatRequest};

/// Scenario: two concurrent "add instance" clicks on the same repeater.
/// The session's advisory lock serializes them; they must commit distinct
/// suffixes, never two copies of the same one.
#[test]
fn concurrent_requests_on_one_repeater_serialize() {
    let store = MemoryBackend::new();
    seed_panel_repeater(&store);
    let session = Arc::new(DuplicationSession::new(store));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let session = Arc::clone(&session);
        handles.push(thread::spawn(move || {
            session.execute_repeat_duplication("node_rep", &RepeatRequest::default())
        }));
    }
    let mut suffixes: Vec<u32> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap().suffix)
        .collect();
    suffixes.sort_unstable();
    assert_eq!(suffixes, vec![1, 2]);

    let store = session.store();
    for suffix in suffixes {
        let copy_id = format!("node_field-{suffix}");
        let copy = store.node(&copy_id).unwrap().unwrap();
        assert!(!has_double_suffix(&copy.id));
        let formula_id = format!("node_fml_power-{suffix}");
        let formula = store.formula(&formula_id).unwrap().unwrap();
        assert_eq!(formula.node_id, copy_id);
    }
}

/// Requests against different repeaters are independent and may overlap.
#[test]
fn different_repeaters_run_in_parallel() {
    let store = MemoryBackend::new();
    for suffix in ["a", "b", "c", "d"] {
        let repeater_id = format!("node_rep_{suffix}");
        let template_id = format!("node_tpl_{suffix}");
        let mut repeater = Node::new(&repeater_id, "Rep", NodeKind::Repeater, "tree");
        repeater.template_node_ids = vec![template_id.clone()];
        store.insert_node(repeater);
        store.insert_node(Node::new(&template_id, "Tpl", NodeKind::Field, "tree"));
    }
    let session = Arc::new(DuplicationSession::new(store));

    let mut handles = Vec::new();
    for suffix in ["a", "b", "c", "d"] {
        let session = Arc::clone(&session);
        let repeater_id = format!("node_rep_{suffix}");
        handles.push(thread::spawn(move || {
            session.execute_repeat_duplication(&repeater_id, &RepeatRequest::default())
        }));
    }
    for handle in handles {
        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.suffix, 1);
    }
    for suffix in ["a", "b", "c", "d"] {
        let copy_id = format!("node_tpl_{suffix}-1");
        assert!(session.store().node(&copy_id).unwrap().is_some());
    }
}

/// Hammering one repeater from many threads still yields a dense,
/// collision-free suffix sequence.
#[test]
fn many_concurrent_requests_allocate_densely() {
    let store = MemoryBackend::new();
    seed_panel_repeater(&store);
    let session = Arc::new(DuplicationSession::new(store));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let session = Arc::clone(&session);
        handles.push(thread::spawn(move || {
            session.execute_repeat_duplication("node_rep", &RepeatRequest::default())
        }));
    }
    let mut suffixes: Vec<u32> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap().suffix)
        .collect();
    suffixes.sort_unstable();
    assert_eq!(suffixes, (1..=8).collect::<Vec<u32>>());
}
