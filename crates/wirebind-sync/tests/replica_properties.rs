//! Replica Property Tests
//!
//! Property-based checks of the replica map under arbitrary interleavings of
//! local mutations, echoed confirmations, foreign mutations and resets.
//!
//! ## Properties Verified
//!
//! 1. **Effective view**: reads always equal overlay-then-confirmed resolution
//! 2. **Local precedence**: a key's newest local value stays visible until its
//!    own confirmation arrives, whatever order earlier confirmations take
//! 3. **Idempotence**: re-applying a batch leaves the confirmed store unchanged
//! 4. **Convergence**: replicas fed the same inbound stream agree on the
//!    confirmed store regardless of their local pending writes

use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use wirebind_core::SeededTokenSource;
use wirebind_sync::{
    Change, FnSink, Mutation, MutationToken, NoOpSink, OutboundMutation, SyncMap,
};

const KEYS: u8 = 4;

#[derive(Debug, Clone)]
enum Op {
    Write(u8, i32),
    Delete(u8),
    EchoLatest,
    Foreign(u64, u8, Option<i32>),
    Reset,
}

fn arbitrary_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..KEYS, any::<i32>()).prop_map(|(k, v)| Op::Write(k, v)),
        2 => (0..KEYS).prop_map(Op::Delete),
        2 => Just(Op::EchoLatest),
        2 => (any::<u64>(), 0..KEYS, any::<Option<i32>>()).prop_map(|(t, k, v)| Op::Foreign(t, k, v)),
        1 => Just(Op::Reset),
    ]
}

/// Local mutations paired with a delivery order for their confirmations
fn mutations_and_delivery() -> impl Strategy<Value = (Vec<(u8, Option<i32>)>, Vec<usize>)> {
    prop::collection::vec((0..KEYS, any::<Option<i32>>()), 1..24).prop_flat_map(|muts| {
        let n = muts.len();
        (Just(muts), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    })
}

fn arbitrary_batch() -> impl Strategy<Value = Mutation<u8, i32>> {
    (
        any::<u64>(),
        prop::collection::hash_map(0..KEYS, any::<Option<i32>>(), 0..4),
    )
        .prop_map(|(token, changes)| {
            changes
                .into_iter()
                .fold(Mutation::new(MutationToken(token)), |mut m, (k, v)| {
                    m.changes.insert(k, Change::from(v));
                    m
                })
        })
}

type Outbox = Arc<Mutex<Vec<OutboundMutation<u8, i32>>>>;

fn recording_replica(seed: u64) -> (SyncMap<u8, i32>, Outbox) {
    let outbox: Outbox = Arc::new(Mutex::new(Vec::new()));
    let outbox_clone = outbox.clone();
    let map = SyncMap::with_token_source(
        FnSink::new(move |m: OutboundMutation<u8, i32>| {
            outbox_clone.lock().push(m);
            Ok(())
        }),
        SeededTokenSource::new(seed),
    );
    (map, outbox)
}

fn local_mutate(map: &SyncMap<u8, i32>, key: u8, value: Option<i32>) -> MutationToken {
    match value {
        Some(v) => map.write(key, v).unwrap(),
        None => map.delete(key).unwrap(),
    }
}

proptest! {
    #[test]
    fn reads_follow_overlay_then_confirmed(ops in prop::collection::vec(arbitrary_op(), 0..40)) {
        let (map, outbox) = recording_replica(7);

        for op in ops {
            match op {
                Op::Write(k, v) => { map.write(k, v).unwrap(); }
                Op::Delete(k) => { map.delete(k).unwrap(); }
                Op::EchoLatest => {
                    let latest = outbox.lock().last().cloned();
                    if let Some(m) = latest {
                        map.apply(m);
                    }
                }
                Op::Foreign(t, k, v) => {
                    let foreign = match v {
                        Some(v) => Mutation::set(MutationToken(t), k, v),
                        None => Mutation::delete(MutationToken(t), k),
                    };
                    map.apply(foreign);
                }
                Op::Reset => { map.optimistic_reset(); }
            }

            for k in 0..KEYS {
                let expected = match map.pending_entry(&k) {
                    Some(entry) => entry.payload,
                    None => map.confirmed(&k),
                };
                prop_assert_eq!(map.get(&k), expected);
                prop_assert_eq!(map.contains(&k), expected.is_some());
                prop_assert_eq!(map.snapshot().get(&k).copied(), expected);
            }
        }
    }

    #[test]
    fn newest_local_value_survives_reordered_confirmations(
        (muts, delivery) in mutations_and_delivery()
    ) {
        let (map, outbox) = recording_replica(11);

        let mut latest: HashMap<u8, (MutationToken, Option<i32>)> = HashMap::new();
        for (k, v) in &muts {
            let token = local_mutate(&map, *k, *v);
            latest.insert(*k, (token, *v));
        }
        let sent = outbox.lock().clone();
        prop_assert_eq!(sent.len(), muts.len());

        let mut confirmed_latest: Vec<u8> = Vec::new();
        for idx in delivery {
            let mutation = sent[idx].clone();
            let (k, _) = muts[idx];
            if latest[&k].0 == mutation.token {
                confirmed_latest.push(k);
            }
            map.apply(mutation);

            for (k, (_, value)) in &latest {
                if !confirmed_latest.contains(k) {
                    prop_assert!(map.is_pending(k));
                    prop_assert_eq!(map.get(k), *value);
                }
            }
        }

        prop_assert_eq!(map.pending_len(), 0);
    }

    #[test]
    fn reapplying_a_batch_is_idempotent_on_confirmed(
        setup in prop::collection::vec(arbitrary_batch(), 0..6),
        batch in arbitrary_batch()
    ) {
        let map: SyncMap<u8, i32> = SyncMap::new(NoOpSink);
        for m in setup {
            map.apply(m);
        }

        map.apply(batch.clone());
        let once = map.confirmed_snapshot();
        map.apply(batch);

        prop_assert_eq!(map.confirmed_snapshot(), once);
    }

    #[test]
    fn replicas_converge_on_the_same_inbound_stream(
        local in prop::collection::vec((0..KEYS, any::<Option<i32>>()), 0..8),
        inbound in prop::collection::vec(arbitrary_batch(), 0..12)
    ) {
        let (busy, _) = recording_replica(3);
        let idle: SyncMap<u8, i32> = SyncMap::new(NoOpSink);

        for (k, v) in local {
            local_mutate(&busy, k, v);
        }
        for m in inbound {
            busy.apply(m.clone());
            idle.apply(m);
        }

        prop_assert_eq!(busy.confirmed_snapshot(), idle.confirmed_snapshot());
    }
}
