//! Fund-lock discipline: concurrent producers never share an input.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::TestEnv;
use lib_types::{Address, AddressHash, OutPoint};

#[tokio::test]
async fn test_concurrent_sends_have_disjoint_inputs() {
    let env = TestEnv::new();
    env.fund(30, 1_000_000).await;

    let targets = [
        Address::new(0, AddressHash::new([0xe1; 32])),
        Address::new(0, AddressHash::new([0xe2; 32])),
        Address::new(0, AddressHash::new([0xe3; 32])),
    ];

    let mut handles = Vec::new();
    for to in targets {
        let wallet = Arc::clone(&env.wallet);
        handles.push(tokio::spawn(async move {
            wallet
                .send(to, 1_000_000, Default::default())
                .await
                .unwrap()
        }));
    }

    let mut input_sets: Vec<HashSet<OutPoint>> = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap();
        let tx = result.tx.unwrap();
        input_sets.push(tx.inputs.iter().map(|i| i.prevout).collect());
    }

    // Pairwise disjoint input sets.
    for i in 0..input_sets.len() {
        for j in i + 1..input_sets.len() {
            assert!(
                input_sets[i].is_disjoint(&input_sets[j]),
                "producers {} and {} shared an input",
                i,
                j
            );
        }
    }

    // All three are in the mempool and mine into the next block.
    assert_eq!(env.chain.mempool_len(), 3);
    let (_, txs) = env.chain.mine();
    assert_eq!(txs.len(), 3);
}

#[tokio::test]
async fn test_sequential_sends_also_disjoint() {
    let env = TestEnv::new();
    env.fund(10, 1_000_000).await;

    let mut seen: HashSet<OutPoint> = HashSet::new();
    for byte in [0xf1u8, 0xf2, 0xf3, 0xf4] {
        let to = Address::new(0, AddressHash::new([byte; 32]));
        let result = env.wallet.send(to, 500_000, Default::default()).await.unwrap();
        for input in &result.tx.unwrap().inputs {
            assert!(
                seen.insert(input.prevout),
                "input {} reused across transactions",
                input.prevout
            );
        }
    }
}

#[tokio::test]
async fn test_soft_locked_coin_is_not_selected() {
    let env = TestEnv::new();
    env.fund(2, 1_000_000).await;

    // Lock one of the two deposit coins by hand: a 1.5M send now needs
    // both and fails.
    let credits = env.wallet.credits(Some(0)).await;
    assert_eq!(credits.len(), 2);
    let pinned = credits[0].outpoint();
    assert!(env.wallet.lock_coin(pinned));
    assert_eq!(env.wallet.locked_coins(), vec![pinned]);

    let to = Address::new(0, AddressHash::new([0xaa; 32]));
    let err = env.wallet.send(to, 1_500_000, Default::default()).await;
    assert!(matches!(
        err,
        Err(lib_wallet::WalletError::InsufficientFunds { .. })
    ));

    // Unlocking releases it for selection.
    assert!(env.wallet.unlock_coin(&pinned));
    let result = env.wallet.send(to, 1_500_000, Default::default()).await.unwrap();
    assert_eq!(result.tx.unwrap().inputs.len(), 2);
}

#[tokio::test]
async fn test_resend_rebroadcasts_until_confirmed() {
    let env = TestEnv::new();
    env.fund(2, 1_000_000).await;

    let to = Address::new(0, AddressHash::new([0xb1; 32]));
    env.wallet.send(to, 100_000, Default::default()).await.unwrap();
    let broadcasts = env.chain.broadcast_count();

    // The transaction is pending: resend pushes it out again.
    assert_eq!(env.wallet.resend().await.unwrap(), 1);
    assert_eq!(env.chain.broadcast_count(), broadcasts + 1);

    // Once mined, there is nothing left to resend.
    env.mine().await;
    assert_eq!(env.wallet.resend().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unconfirmed_change_is_respendable() {
    // One coin, two sequential sends: the second spends the first's
    // unconfirmed change without waiting for a block.
    let env = TestEnv::new();
    env.fund(1, 10_000_000).await;

    let to1 = Address::new(0, AddressHash::new([0xc1; 32]));
    let to2 = Address::new(0, AddressHash::new([0xc2; 32]));
    let first = env.wallet.send(to1, 1_000_000, Default::default()).await.unwrap();
    let first_txid = first.outputs[0].tx_hash;

    let second = env.wallet.send(to2, 1_000_000, Default::default()).await.unwrap();
    let second_tx = second.tx.unwrap();
    assert!(
        second_tx.inputs.iter().any(|i| i.prevout.tx == first_txid),
        "second send spends the first's change"
    );
}
