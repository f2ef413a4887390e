//! Integration tests for the session and lock registries under contention.
//!
//! Many tasks hammer the same registries concurrently; the tests check the
//! single-holder and single-session guarantees hold regardless of timing.

use std::sync::Arc;

use bank_core::{AccountId, BankError, ResourceId, Role, SessionToken, Username};
use bankd::{LockRegistry, SessionRegistry};

/// Number of concurrent contenders per test
const CONTENDERS: usize = 32;

fn account(id: u64) -> ResourceId {
    ResourceId::Account(AccountId::new(id))
}

// ============================================================================
// Locks
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_has_one_winner() {
    let locks = Arc::new(LockRegistry::new());
    locks.register_slot(account(1));

    let mut handles = Vec::new();
    for i in 0..CONTENDERS {
        let locks = Arc::clone(&locks);
        handles.push(tokio::spawn(async move {
            let holder = SessionToken::new(format!("session-{i}"));
            locks.try_acquire(&account(1), &holder).map(|()| holder)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(holder) => winners.push(holder),
            Err(err) => assert!(matches!(err, BankError::ResourceBusy { .. })),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(locks.holder(&account(1)).as_ref(), winners.first());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_resources_do_not_contend() {
    let locks = Arc::new(LockRegistry::new());
    for i in 0..CONTENDERS {
        locks.register_slot(account(i as u64));
    }

    let mut handles = Vec::new();
    for i in 0..CONTENDERS {
        let locks = Arc::clone(&locks);
        handles.push(tokio::spawn(async move {
            let holder = SessionToken::new(format!("session-{i}"));
            locks.try_acquire(&account(i as u64), &holder)
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(locks.slot_count(), CONTENDERS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_release_all_frees_only_callers_locks() {
    let locks = Arc::new(LockRegistry::new());
    let a = SessionToken::new("a");
    let b = SessionToken::new("b");
    let alice = ResourceId::Profile(Username::new("alice"));
    locks.register_slot(alice.clone());

    for id in 0..10 {
        locks.register_slot(account(id));
    }
    for id in 0..10 {
        let holder = if id % 2 == 0 { &a } else { &b };
        locks.try_acquire(&account(id), holder).unwrap();
    }
    locks.try_acquire(&alice, &a).unwrap();

    // Release a's locks while b keeps re-acquiring its own
    let releaser = {
        let locks = Arc::clone(&locks);
        let a = a.clone();
        tokio::spawn(async move { locks.release_all(&a) })
    };
    let reacquirer = {
        let locks = Arc::clone(&locks);
        let b = b.clone();
        tokio::spawn(async move {
            for id in (1..10).step_by(2) {
                locks.try_acquire(&account(id), &b).unwrap();
            }
        })
    };

    let released = releaser.await.unwrap();
    reacquirer.await.unwrap();

    assert_eq!(released.len(), 6);
    assert!(locks.held_by(&a).is_empty());
    assert_eq!(locks.held_by(&b).len(), 5);
    for id in (1..10).step_by(2) {
        assert!(locks.is_held_by(&account(id), &b));
    }
}

#[tokio::test]
async fn test_released_lock_can_be_taken_by_another() {
    let locks = LockRegistry::new();
    locks.register_slot(account(7));
    let a = SessionToken::new("a");
    let b = SessionToken::new("b");

    locks.try_acquire(&account(7), &a).unwrap();
    assert!(locks.try_acquire(&account(7), &b).is_err());

    assert!(locks.release(&account(7), &a));
    assert!(locks.try_acquire(&account(7), &b).is_ok());
    assert!(!locks.release(&account(7), &a));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_removed_slots_stay_gone_under_contention() {
    let locks = Arc::new(LockRegistry::new());
    for i in 0..CONTENDERS {
        locks.register_slot(account(i as u64));
    }

    let remover = {
        let locks = Arc::clone(&locks);
        tokio::spawn(async move {
            for i in 0..CONTENDERS {
                locks.remove_slot(&account(i as u64));
            }
        })
    };
    let mut handles = Vec::new();
    for i in 0..CONTENDERS {
        let locks = Arc::clone(&locks);
        handles.push(tokio::spawn(async move {
            let holder = SessionToken::new(format!("session-{i}"));
            match locks.try_acquire(&account(i as u64), &holder) {
                Ok(()) => {}
                Err(err) => assert!(matches!(err, BankError::UnknownResource { .. })),
            }
            holder
        }));
    }

    remover.await.unwrap();
    for handle in handles {
        let holder = handle.await.unwrap();
        assert!(locks.held_by(&holder).is_empty());
    }
    assert_eq!(locks.slot_count(), 0);
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins_one_session() {
    let sessions = Arc::new(SessionRegistry::new());

    let mut handles = Vec::new();
    for _ in 0..CONTENDERS {
        let sessions = Arc::clone(&sessions);
        handles.push(tokio::spawn(async move {
            sessions.create(Username::new("alice"), Role::Client)
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(err) => assert!(matches!(err, BankError::AlreadyLoggedIn { .. })),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(sessions.len(), 1);
}

#[tokio::test]
async fn test_tokens_unique_across_logins() {
    let sessions = SessionRegistry::new();
    let first = sessions.create(Username::new("alice"), Role::Client).unwrap();
    sessions.remove(&first.token);
    let second = sessions.create(Username::new("alice"), Role::Client).unwrap();

    assert_ne!(first.token, second.token);
    assert!(sessions.lookup(&first.token).is_none());
}
