//! Transaction Builder
//!
//! The unfunded intermediate the engine hands to the funder: the outputs
//! (and any protocol-required inputs) an action demands, before coin
//! selection. The engine never signs and never broadcasts; the builder is
//! its whole vocabulary.

use lib_coins::Coin;
use lib_types::{Amount, BlockHeight, Output};

/// An unfunded transaction under construction.
#[derive(Debug, Clone, Default)]
pub struct TxBuilder {
    /// Outputs the action demands, in order.
    pub outputs: Vec<Output>,
    /// Inputs the protocol requires (owner coin, BID being revealed, ...).
    /// Each carries the full coin so the funder can account its value and
    /// the signer can derive its keyring.
    pub inputs: Vec<Coin>,
    /// Account whose credits fund the remainder.
    pub account: u32,
    /// The final transaction must have exactly the pre-added input and no
    /// funding inputs (pre-signed REVEAL discipline).
    pub single_input: bool,
    /// Apply canonical member sorting after funding.
    pub sort: bool,
    /// Locktime applied after funding.
    pub locktime: BlockHeight,
}

impl TxBuilder {
    pub fn new(account: u32) -> Self {
        Self {
            account,
            sort: true,
            ..Self::default()
        }
    }

    pub fn push_output(&mut self, output: Output) -> &mut Self {
        self.outputs.push(output);
        self
    }

    pub fn push_input(&mut self, coin: Coin) -> &mut Self {
        self.inputs.push(coin);
        self
    }

    /// Sum of pre-added input values.
    pub fn input_value(&self) -> Amount {
        self.inputs.iter().map(|c| c.value).sum()
    }

    /// Sum of output values.
    pub fn output_value(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Merge another builder's members (batch packing).
    pub fn absorb(&mut self, other: TxBuilder) {
        self.outputs.extend(other.outputs);
        self.inputs.extend(other.inputs);
        self.single_input = self.single_input || other.single_input;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::{Address, AddressHash, Covenant, OutPoint, TxHash};

    fn coin(value: Amount) -> Coin {
        Coin {
            outpoint: OutPoint::new(TxHash::new([1; 32]), 0),
            value,
            address: Address::new(0, AddressHash::new([2; 32])),
            covenant: Covenant::None,
            height: Some(1),
            coinbase: false,
        }
    }

    #[test]
    fn test_value_accounting() {
        let mut builder = TxBuilder::new(0);
        builder.push_input(coin(1_500));
        builder.push_output(Output::pay(1_000, Address::new(0, AddressHash::new([3; 32]))));
        assert_eq!(builder.input_value(), 1_500);
        assert_eq!(builder.output_value(), 1_000);
        assert!(builder.sort);
    }

    #[test]
    fn test_absorb_merges_members() {
        let mut a = TxBuilder::new(0);
        a.push_output(Output::pay(1, Address::new(0, AddressHash::new([3; 32]))));
        let mut b = TxBuilder::new(0);
        b.push_output(Output::pay(2, Address::new(0, AddressHash::new([4; 32]))));
        b.push_input(coin(10));
        a.absorb(b);
        assert_eq!(a.outputs.len(), 2);
        assert_eq!(a.inputs.len(), 1);
    }
}
