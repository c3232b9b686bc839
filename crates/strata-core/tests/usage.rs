//! Repository lifecycle and usage errors

use strata_core::{TransactionConfig, TransactionError, TransactionManager, UsageError};
use strata_model::{EntityId, RepositoryId};
use strata_test_utils::{add_note, add_track, manager_with_clone, new_song, pitches};

#[test]
fn operations_on_unknown_repositories_are_usage_errors() {
    let manager = TransactionManager::new();
    let unknown = RepositoryId::of_root(EntityId::next());
    let expected = TransactionError::Usage(UsageError::TransactionsNotEnabled(unknown));

    assert_eq!(manager.commit(unknown).unwrap_err(), expected);
    assert_eq!(manager.pull(unknown).unwrap_err(), expected);
    assert_eq!(manager.clone_repository(unknown).unwrap_err(), expected);
    assert_eq!(manager.undo(unknown).unwrap_err(), expected);
    assert!(manager.revert(unknown).unwrap_err().is_usage());
    assert!(!manager.revert(unknown).unwrap_err().is_fatal());
}

#[test]
fn only_one_initial_repository() {
    let manager = TransactionManager::new();
    let origin = manager.enable_transactions(new_song()).unwrap();
    assert_eq!(manager.initial_repository(), Some(origin));

    let err = manager.enable_transactions(new_song()).unwrap_err();
    assert_eq!(err, TransactionError::Usage(UsageError::InitialRootExists(origin)));
    assert_eq!(manager.repositories(), vec![origin]);
}

#[test]
fn existing_entities_become_the_baseline() {
    let manager = TransactionManager::new();
    let mut model = new_song();
    let lead = add_track(&mut model, "lead");
    add_note(&mut model, lead, 48);
    let origin = manager.enable_transactions(model).unwrap();

    assert!(!manager.has_local_changes(origin).unwrap());
    assert!(manager.commit(origin).unwrap().is_none());
    let tracked = manager.repository(origin).unwrap().lock().remote().len();
    assert_eq!(tracked, 3);
}

#[test]
fn disable_hands_the_model_back() {
    let (manager, origin, copy) = manager_with_clone(TransactionConfig::new());
    manager
        .with_model_mut(copy, |m| {
            let t = add_track(m, "lead");
            add_note(m, t, 55);
        })
        .unwrap();
    manager.commit(copy).unwrap().unwrap();
    assert_eq!(manager.log_len(), 1);

    let model = manager.disable_transactions(origin).unwrap();
    assert!(!model.is_journaled());
    assert_eq!(manager.initial_repository(), None);
    assert_eq!(manager.repositories(), vec![copy]);
    // origin no longer holds back collection
    assert_eq!(manager.log_len(), 0);

    let err = manager.commit(origin).unwrap_err();
    assert_eq!(err, TransactionError::Usage(UsageError::TransactionsNotEnabled(origin)));
    assert_eq!(pitches(&manager, copy), vec![55]);

    // A fresh initial repository is accepted again
    let next = manager.enable_transactions(model).unwrap();
    assert_eq!(next, origin);
}

#[test]
fn disable_refuses_while_a_handle_is_held() {
    let manager = TransactionManager::new();
    let origin = manager.enable_transactions(new_song()).unwrap();
    let handle = manager.repository(origin).unwrap();

    let err = manager.disable_transactions(origin).unwrap_err();
    assert_eq!(err, TransactionError::Usage(UsageError::RepositoryBusy(origin)));
    drop(handle);
    assert!(manager.disable_transactions(origin).is_ok());
}

#[test]
fn removing_the_root_is_rejected() {
    let manager = TransactionManager::new();
    let origin = manager.enable_transactions(new_song()).unwrap();
    let result = manager.with_model_mut(origin, |m| m.remove(m.root())).unwrap();
    assert!(result.is_err());
    assert!(!manager.has_local_changes(origin).unwrap());
}
