//! Shared test fixtures: an in-process regtest chain, a dummy signer, and
//! a deterministic keyring.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lib_coins::{Coin, SledWalletStore, WalletStore};
use lib_namestate::NameState;
use lib_rules::{name_hash, NetworkParams};
use lib_types::{
    Address, AddressHash, Amount, BlockHash, BlockHeight, Covenant, NameHash, OutPoint, Output,
    Transaction,
};
use lib_wallet::{
    CallOptions, ChainView, KeyRing, NameStatus, Signer, Wallet, WalletConfig, WalletError,
};

// ============================================================================
// MOCK CHAIN
// ============================================================================

struct ChainInner {
    height: BlockHeight,
    states: HashMap<NameHash, NameState>,
    mempool: Vec<Transaction>,
    broadcasts: usize,
}

/// A minimal regtest chain that applies covenant effects on mine, enough to
/// walk a full auction: second-price accounting on reveals, ownership
/// tracking, transfer/finalize/revoke bookkeeping.
#[derive(Clone)]
pub struct MockChain {
    params: NetworkParams,
    inner: Arc<Mutex<ChainInner>>,
}

impl MockChain {
    pub fn new(params: NetworkParams) -> Self {
        Self {
            params,
            inner: Arc::new(Mutex::new(ChainInner {
                height: 0,
                states: HashMap::new(),
                mempool: Vec::new(),
                broadcasts: 0,
            })),
        }
    }

    pub fn tip(&self) -> BlockHeight {
        self.inner.lock().unwrap().height
    }

    pub fn mempool_len(&self) -> usize {
        self.inner.lock().unwrap().mempool.len()
    }

    pub fn broadcast_count(&self) -> usize {
        self.inner.lock().unwrap().broadcasts
    }

    /// Transactions in the mempool carrying an OPEN for `name`.
    pub fn mempool_opens(&self, name: &str) -> usize {
        let hash = name_hash(name);
        let inner = self.inner.lock().unwrap();
        inner
            .mempool
            .iter()
            .filter(|tx| {
                tx.outputs.iter().any(|o| {
                    matches!(&o.covenant, Covenant::Open { name_hash, .. } if *name_hash == hash)
                })
            })
            .count()
    }

    pub fn state_of(&self, name: &str) -> Option<NameState> {
        self.inner
            .lock()
            .unwrap()
            .states
            .get(&name_hash(name))
            .cloned()
    }

    /// Mine one block containing the current mempool; returns the
    /// confirmed transactions so wallets can ingest them.
    pub fn mine(&self) -> (BlockHeight, Vec<Transaction>) {
        let mut inner = self.inner.lock().unwrap();
        inner.height += 1;
        let height = inner.height;
        let txs: Vec<Transaction> = inner.mempool.drain(..).collect();
        for tx in &txs {
            apply_tx(&mut inner.states, tx, height);
        }
        (height, txs)
    }

    /// Mine `n` empty blocks.
    pub fn advance(&self, n: BlockHeight) {
        let mut inner = self.inner.lock().unwrap();
        inner.height += n;
    }

    /// Advance the chain until `target` is reached.
    pub fn advance_to(&self, target: BlockHeight) {
        let mut inner = self.inner.lock().unwrap();
        if inner.height < target {
            inner.height = target;
        }
    }
}

fn apply_tx(states: &mut HashMap<NameHash, NameState>, tx: &Transaction, height: BlockHeight) {
    let txid = tx.txid();
    for (vout, output) in tx.outputs.iter().enumerate() {
        let outpoint = OutPoint::new(txid, vout as u32);
        match &output.covenant {
            Covenant::None => {}
            Covenant::Open { name_hash, .. } => {
                states.insert(*name_hash, NameState::open(*name_hash, height));
            }
            Covenant::Bid { .. } => {}
            Covenant::Reveal { name_hash, .. } => {
                if let Some(ns) = states.get_mut(name_hash) {
                    let value = output.value;
                    if value > ns.highest {
                        ns.value = ns.highest;
                        ns.highest = value;
                        ns.owner = Some(outpoint);
                    } else if value > ns.value {
                        ns.value = value;
                    }
                }
            }
            Covenant::Redeem { .. } => {}
            Covenant::Register {
                name_hash,
                resource,
                ..
            } => {
                if let Some(ns) = states.get_mut(name_hash) {
                    ns.owner = Some(outpoint);
                    ns.data = resource.clone();
                    ns.renewal = height;
                }
            }
            Covenant::Update {
                name_hash,
                resource,
                ..
            } => {
                if let Some(ns) = states.get_mut(name_hash) {
                    ns.owner = Some(outpoint);
                    if !resource.is_empty() {
                        ns.data = resource.clone();
                    }
                    ns.transfer = None;
                }
            }
            Covenant::Renew { name_hash, .. } => {
                if let Some(ns) = states.get_mut(name_hash) {
                    ns.owner = Some(outpoint);
                    ns.renewal = height;
                    ns.renewals += 1;
                }
            }
            Covenant::Transfer { name_hash, .. } => {
                if let Some(ns) = states.get_mut(name_hash) {
                    ns.owner = Some(outpoint);
                    ns.transfer = Some(height);
                }
            }
            Covenant::Finalize { name_hash, .. } => {
                if let Some(ns) = states.get_mut(name_hash) {
                    ns.owner = Some(outpoint);
                    ns.transfer = None;
                    ns.renewal = height;
                }
            }
            Covenant::Revoke { name_hash, .. } => {
                if let Some(ns) = states.get_mut(name_hash) {
                    ns.revoked = Some(height);
                }
            }
            Covenant::Claim { .. } => {}
        }
    }
}

#[async_trait]
impl ChainView for MockChain {
    async fn height(&self) -> Result<BlockHeight, WalletError> {
        Ok(self.inner.lock().unwrap().height)
    }

    async fn name_state(&self, name_hash: &NameHash) -> Result<Option<NameState>, WalletError> {
        Ok(self.inner.lock().unwrap().states.get(name_hash).cloned())
    }

    async fn name_status(&self, name_hash: &NameHash) -> Result<NameStatus, WalletError> {
        let inner = self.inner.lock().unwrap();
        let state = inner.states.get(name_hash).cloned();
        Ok(NameStatus {
            available: state.is_none(),
            state,
        })
    }

    async fn is_available(&self, name_hash: &NameHash) -> Result<bool, WalletError> {
        Ok(!self.inner.lock().unwrap().states.contains_key(name_hash))
    }

    async fn renewal_block(&self) -> Result<BlockHash, WalletError> {
        let height = self.inner.lock().unwrap().height;
        let mut anchor = [0u8; 32];
        anchor[..4].copy_from_slice(&height.to_le_bytes());
        Ok(BlockHash::new(anchor))
    }

    async fn estimate_fee(&self, _blocks: u32) -> Result<Amount, WalletError> {
        Ok(1_000)
    }

    async fn send(&self, tx: &Transaction) -> Result<(), WalletError> {
        let mut inner = self.inner.lock().unwrap();
        inner.mempool.push(tx.clone());
        inner.broadcasts += 1;
        Ok(())
    }

    async fn add_tx(&self, tx: &Transaction) -> Result<(), WalletError> {
        self.inner.lock().unwrap().mempool.push(tx.clone());
        Ok(())
    }

    async fn send_claim(&self, _claim: &[u8]) -> Result<(), WalletError> {
        Ok(())
    }
}

// ============================================================================
// MOCK SIGNER
// ============================================================================

pub struct MockSigner {
    pub watch_only: bool,
}

impl MockSigner {
    pub fn new() -> Self {
        Self { watch_only: false }
    }
}

#[async_trait]
impl Signer for MockSigner {
    async fn sign(&self, tx: &mut Transaction, coins: &[Coin]) -> Result<(), WalletError> {
        if self.watch_only {
            return Err(WalletError::CannotSignWatchOnly);
        }
        assert_eq!(tx.inputs.len(), coins.len());
        for input in &mut tx.inputs {
            input.witness = vec![vec![0xaa; 65], vec![0xbb; 33]];
        }
        Ok(())
    }

    fn is_watch_only(&self) -> bool {
        self.watch_only
    }
}

// ============================================================================
// MOCK KEYRING
// ============================================================================

struct KeyInner {
    fresh_counter: u32,
    owned: HashMap<Address, u32>,
}

/// Deterministic address derivation with a reverse map for `account_of`.
#[derive(Clone)]
pub struct MockKeyRing {
    seed: u8,
    inner: Arc<Mutex<KeyInner>>,
}

impl MockKeyRing {
    pub fn new(seed: u8) -> Self {
        Self {
            seed,
            inner: Arc::new(Mutex::new(KeyInner {
                fresh_counter: 0,
                owned: HashMap::new(),
            })),
        }
    }

    fn derive(&self, label: &str, account: u32, index: u32) -> Address {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[self.seed]);
        hasher.update(label.as_bytes());
        hasher.update(&account.to_le_bytes());
        hasher.update(&index.to_le_bytes());
        let address = Address::new(0, AddressHash::new(hasher.finalize().into()));
        self.inner.lock().unwrap().owned.insert(address, account);
        address
    }
}

impl KeyRing for MockKeyRing {
    fn receive_address(&self, account: u32) -> Result<Address, WalletError> {
        Ok(self.derive("receive", account, 0))
    }

    fn fresh_receive_address(&self, account: u32) -> Result<Address, WalletError> {
        let index = {
            let mut inner = self.inner.lock().unwrap();
            inner.fresh_counter += 1;
            inner.fresh_counter
        };
        Ok(self.derive("fresh", account, index))
    }

    fn change_address(&self, account: u32) -> Result<Address, WalletError> {
        Ok(self.derive("change", account, 0))
    }

    fn account_pubkey(&self, account: u32, index: u32) -> Result<[u8; 33], WalletError> {
        let mut key = [0u8; 33];
        key[0] = 0x02;
        key[1] = self.seed;
        key[2..6].copy_from_slice(&account.to_le_bytes());
        key[6..10].copy_from_slice(&index.to_le_bytes());
        Ok(key)
    }

    fn account_of(&self, address: &Address) -> Option<u32> {
        self.inner.lock().unwrap().owned.get(address).copied()
    }
}

// ============================================================================
// TEST ENVIRONMENT
// ============================================================================

pub type TestWallet = Wallet<MockChain, MockSigner, MockKeyRing>;

pub struct TestEnv {
    pub chain: MockChain,
    pub wallet: Arc<TestWallet>,
    pub keyring: MockKeyRing,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(WalletConfig::default())
    }

    pub fn with_config(config: WalletConfig) -> Self {
        Self::build(MockChain::new(NetworkParams::regtest()), 1, config)
    }

    /// A second wallet on the same chain (distinct keys and store).
    pub fn sibling(&self, seed: u8) -> Self {
        Self::build(self.chain.clone(), seed, WalletConfig::default())
    }

    fn build(chain: MockChain, seed: u8, config: WalletConfig) -> Self {
        let store: Arc<dyn WalletStore> = Arc::new(SledWalletStore::temporary().unwrap());
        let keyring = MockKeyRing::new(seed);
        let wallet = Wallet::open(
            store,
            chain.clone(),
            MockSigner::new(),
            keyring.clone(),
            NetworkParams::regtest(),
            config,
        )
        .unwrap();
        Self {
            chain,
            wallet: Arc::new(wallet),
            keyring,
        }
    }

    /// Deposit `count` coins of `value` to the wallet and confirm them.
    pub async fn fund(&self, count: usize, value: Amount) {
        let address = self.keyring.receive_address(0).unwrap();
        let deposit = Transaction {
            version: 0,
            inputs: Vec::new(),
            outputs: (0..count)
                .map(|_| Output::pay(value, address))
                .collect(),
            locktime: 0,
        };
        self.chain.add_tx(&deposit).await.unwrap();
        self.mine().await;
    }

    /// Mine one block and let the wallet ingest it.
    pub async fn mine(&self) -> BlockHeight {
        let (height, txs) = self.chain.mine();
        self.wallet.apply_confirmed(height, &txs).await.unwrap();
        height
    }

    /// Advance empty blocks (no wallet ingest needed).
    pub fn advance(&self, n: BlockHeight) {
        self.chain.advance(n);
    }

    pub fn options(&self) -> CallOptions {
        CallOptions::default()
    }

    pub fn keyed_options(&self, key: &str) -> CallOptions {
        CallOptions {
            idempotency_key: Some(key.to_string()),
            ..CallOptions::default()
        }
    }

    /// Walk `name` from OPEN through the end of the reveal period with a
    /// single bid, leaving the auction closed and won by this wallet.
    pub async fn win_auction(&self, name: &str, bid: Amount, lockup: Amount) {
        let params = NetworkParams::regtest();

        self.wallet.open_name(name, self.options()).await.unwrap();
        self.mine().await;
        let epoch = self.chain.state_of(name).unwrap().height;

        self.chain.advance_to(params.bidding_start(epoch));
        self.wallet
            .bid(name, bid, lockup, self.options())
            .await
            .unwrap();
        self.mine().await;

        self.chain.advance_to(params.reveal_start(epoch));
        self.wallet.reveal(name, self.options()).await.unwrap();
        self.mine().await;

        self.chain.advance_to(params.close_height(epoch));
    }
}
