//! Batch construction scenarios: strict packing under the output budget,
//! per-name error surfacing, and the batch-size caps.

mod common;

use common::TestEnv;
use lib_rules::NetworkParams;
use lib_types::CovenantType;
use lib_wallet::{BidRequest, WalletConfig, WalletError};

fn budget_config(output_budget: usize) -> WalletConfig {
    WalletConfig {
        output_budget,
        ..WalletConfig::default()
    }
}

/// Open four names and place 100/50/25/12 bids. Returns the epoch height.
async fn seed_bids(env: &TestEnv, counts: &[(&str, usize)]) -> u32 {
    let params = NetworkParams::regtest();

    let names: Vec<String> = counts.iter().map(|(n, _)| n.to_string()).collect();
    env.wallet
        .batch_open(&names, env.options())
        .await
        .unwrap();
    env.mine().await;
    let epoch = env.chain.state_of(&names[0]).unwrap().height;

    env.chain.advance_to(params.bidding_start(epoch));
    let bids: Vec<BidRequest> = counts
        .iter()
        .flat_map(|(name, count)| {
            (0..*count).map(|i| BidRequest {
                name: name.to_string(),
                bid: 100 + i as u64,
                lockup: 1_000,
            })
        })
        .collect();
    env.wallet.batch_bid(&bids, env.options()).await.unwrap();
    env.mine().await;

    env.chain.advance_to(params.reveal_start(epoch));
    epoch
}

#[tokio::test]
async fn test_batch_reveal_strict_packing() {
    // 100/50/25/12 bids into a budget of 175: the three largest fit whole,
    // the 12 is rejected whole; a partial reveal would alter the auction.
    let env = TestEnv::with_config(budget_config(175));
    env.fund(8, 100_000_000).await;

    let counts = [("aaa", 100usize), ("bbb", 50), ("ccc", 25), ("ddd", 12)];
    seed_bids(&env, &counts).await;

    let names: Vec<String> = counts.iter().map(|(n, _)| n.to_string()).collect();
    let result = env
        .wallet
        .batch_reveal(&names, env.options())
        .await
        .unwrap();

    // Exactly 175 reveal outputs, none partial.
    assert_eq!(result.outputs.len(), 175);
    assert!(result
        .outputs
        .iter()
        .all(|o| o.covenant == CovenantType::Reveal));

    let revealed: Vec<&str> = {
        let mut names: Vec<&str> = result.outputs.iter().map(|o| o.name.as_str()).collect();
        names.sort();
        names.dedup();
        names
    };
    assert_eq!(revealed, vec!["aaa", "bbb", "ccc"]);

    // The fourth name is surfaced as a rejection, not dropped.
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].name, "ddd");
    assert!(matches!(
        result.errors[0].error,
        WalletError::OutputBudget { count: 12, .. }
    ));

    // And a strict plan never splits: every included name revealed all its
    // bids.
    for (name, count) in [("aaa", 100), ("bbb", 50), ("ccc", 25)] {
        let n = result.outputs.iter().filter(|o| o.name == name).count();
        assert_eq!(n, count, "{} fully revealed", name);
    }
}

#[tokio::test]
async fn test_reveal_all_packs_without_explicit_names() {
    let env = TestEnv::with_config(budget_config(200));
    env.fund(8, 100_000_000).await;

    seed_bids(&env, &[("eee", 3), ("fff", 2)]).await;

    let result = env.wallet.reveal_all(env.options()).await.unwrap();
    assert_eq!(result.outputs.len(), 5);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_batch_open_surfaces_per_name_errors() {
    let env = TestEnv::new();
    env.fund(4, 1_000_000).await;

    let names = vec![
        "good-one".to_string(),
        "-bad-".to_string(),
        "good-two".to_string(),
    ];
    let result = env.wallet.batch_open(&names, env.options()).await.unwrap();

    // The valid names still went out in one transaction.
    assert!(result.tx.is_some());
    assert_eq!(result.outputs.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].name, "-bad-");
    assert!(matches!(
        result.errors[0].error,
        WalletError::InvalidName(_)
    ));
}

#[tokio::test]
async fn test_batch_open_all_invalid_fails_whole_call() {
    let env = TestEnv::new();
    env.fund(2, 1_000_000).await;

    let names = vec!["-a-".to_string(), "-b-".to_string()];
    let err = env.wallet.batch_open(&names, env.options()).await;
    assert!(matches!(err, Err(WalletError::InvalidName(_))));
}

#[tokio::test]
async fn test_batch_caps_at_200_names() {
    let env = TestEnv::new();
    env.fund(2, 1_000_000).await;

    let names: Vec<String> = (0..201).map(|i| format!("name{i}")).collect();
    let err = env.wallet.batch_open(&names, env.options()).await;
    assert!(matches!(
        err,
        Err(WalletError::TooManyNames { got: 201, max: 200 })
    ));

    let bids: Vec<BidRequest> = (0..201)
        .map(|i| BidRequest {
            name: format!("name{i}"),
            bid: 100,
            lockup: 200,
        })
        .collect();
    let err = env.wallet.batch_bid(&bids, env.options()).await;
    assert!(matches!(err, Err(WalletError::TooManyNames { .. })));
}

#[tokio::test]
async fn test_batch_bid_uses_distinct_addresses() {
    // First bid reuses the receive address; later bids derive fresh ones,
    // so no two bid outputs in one batch share an address (which would
    // collide their commitments for equal values).
    let env = TestEnv::new();
    env.fund(4, 10_000_000).await;
    let params = NetworkParams::regtest();

    let names = vec!["one".to_string(), "two".to_string(), "three".to_string()];
    env.wallet.batch_open(&names, env.options()).await.unwrap();
    env.mine().await;
    let epoch = env.chain.state_of("one").unwrap().height;
    env.chain.advance_to(params.bidding_start(epoch));

    let bids: Vec<BidRequest> = names
        .iter()
        .map(|name| BidRequest {
            name: name.clone(),
            bid: 500,
            lockup: 1_000,
        })
        .collect();
    let result = env.wallet.batch_bid(&bids, env.options()).await.unwrap();
    let tx = result.tx.unwrap();

    let mut addresses: Vec<_> = tx
        .outputs
        .iter()
        .filter(|o| o.covenant.covenant_type() == CovenantType::Bid)
        .map(|o| o.address)
        .collect();
    assert_eq!(addresses.len(), 3);
    addresses.sort();
    addresses.dedup();
    assert_eq!(addresses.len(), 3, "each bid has its own address");
}

#[tokio::test]
async fn test_batch_redeem_splits_at_the_budget_boundary() {
    // Four bids on one name; the highest wins, three lose. With a budget
    // of 2 the partial policy redeems two now and reports one left over.
    let env = TestEnv::with_config(budget_config(2));
    env.fund(8, 1_000_000).await;
    let params = NetworkParams::regtest();

    env.wallet.open_name("part", env.options()).await.unwrap();
    env.mine().await;
    let epoch = env.chain.state_of("part").unwrap().height;

    env.chain.advance_to(params.bidding_start(epoch));
    for value in [100u64, 200, 300, 400] {
        env.wallet
            .bid("part", value, 1_000, env.options())
            .await
            .unwrap();
    }
    env.mine().await;

    env.chain.advance_to(params.reveal_start(epoch));
    env.wallet.reveal("part", env.options()).await.unwrap();
    env.mine().await;

    env.chain.advance_to(params.close_height(epoch));
    let result = env
        .wallet
        .batch_redeem(&["part".to_string()], env.options())
        .await
        .unwrap();

    assert_eq!(result.outputs.len(), 2);
    assert!(result
        .outputs
        .iter()
        .all(|o| o.covenant == CovenantType::Redeem));
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        result.errors[0].error,
        WalletError::OutputBudget { count: 1, .. }
    ));

    // The redeem inputs and outputs pair up: the transaction spends
    // exactly two reveals.
    let tx = result.tx.unwrap();
    let redeems = tx
        .outputs
        .iter()
        .filter(|o| o.covenant.covenant_type() == CovenantType::Redeem)
        .count();
    assert_eq!(redeems, 2);
}

#[tokio::test]
async fn test_batch_finish_redeems_and_registers() {
    let w1 = TestEnv::new();
    let w2 = w1.sibling(2);
    w1.fund(4, 1_000_000).await;
    w2.fund(4, 1_000_000).await;
    let params = NetworkParams::regtest();

    w1.wallet.open_name("won", w1.options()).await.unwrap();
    let (height, txs) = w1.chain.mine();
    w1.wallet.apply_confirmed(height, &txs).await.unwrap();
    w2.wallet.apply_confirmed(height, &txs).await.unwrap();
    let epoch = w1.chain.state_of("won").unwrap().height;

    w1.chain.advance_to(params.bidding_start(epoch));
    w1.wallet.bid("won", 800, 1_000, w1.options()).await.unwrap();
    w2.wallet.bid("won", 200, 1_000, w2.options()).await.unwrap();
    let (height, txs) = w1.chain.mine();
    w1.wallet.apply_confirmed(height, &txs).await.unwrap();
    w2.wallet.apply_confirmed(height, &txs).await.unwrap();

    w1.chain.advance_to(params.reveal_start(epoch));
    w1.wallet.reveal("won", w1.options()).await.unwrap();
    w2.wallet.reveal("won", w2.options()).await.unwrap();
    let (height, txs) = w1.chain.mine();
    w1.wallet.apply_confirmed(height, &txs).await.unwrap();
    w2.wallet.apply_confirmed(height, &txs).await.unwrap();

    w1.chain.advance_to(params.close_height(epoch));

    // Winner: FINISH registers (no losing reveals to redeem).
    let result = w1
        .wallet
        .batch_finish(&["won".to_string()], w1.options())
        .await
        .unwrap();
    assert!(result
        .outputs
        .iter()
        .any(|o| o.covenant == CovenantType::Register));

    // Loser: FINISH redeems.
    let result = w2
        .wallet
        .batch_finish(&["won".to_string()], w2.options())
        .await
        .unwrap();
    assert!(result
        .outputs
        .iter()
        .any(|o| o.covenant == CovenantType::Redeem));
}
