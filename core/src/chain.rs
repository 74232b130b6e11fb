//! The ledger: an append-only, index-addressed sequence of blocks.
//!
//! Blocks are stored in a plain `Vec<Block>` keyed by position, not as a
//! linked structure, so that `Chain::add_mined_block`'s earlier-wins
//! tie-break can simply compare two candidates for the same slot without
//! anyone holding an owning pointer into the vector they're about to replace.

use crate::amount::Amount;
use crate::block::Block;
use crate::tx::Tx;
use crate::types::PublicKeyPem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get_by_id(&self, id: u64) -> Option<&Block> {
        self.blocks.get(id as usize)
    }

    pub fn get_by_id_mut(&mut self, id: u64) -> Option<&mut Block> {
        self.blocks.get_mut(id as usize)
    }

    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn tip_hash(&self) -> Option<[u8; 32]> {
        self.blocks.last().and_then(|b| b.hash)
    }

    /// Appends `block` at the next id, which must match `self.len()`.
    pub fn add_block(&mut self, block: Block) -> crate::Result<()> {
        if block.id as usize != self.blocks.len() {
            return Err(crate::Error::PreconditionUnmet);
        }
        if block.previous_hash != self.tip_hash() {
            return Err(crate::Error::InvalidBlock);
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Replaces the block at `candidate.id` with `candidate` if it is mined
    /// and either no block occupies that slot yet or `candidate` was mined
    /// earlier than the incumbent. Ties (identical `mined_at`, which two
    /// competing miners can produce) are broken deterministically by
    /// comparing the blocks' own hash bytes, so every honest peer converges
    /// on the same winner regardless of arrival order.
    pub fn add_mined_block(&mut self, candidate: Block) -> crate::Result<bool> {
        let Some(candidate_mined_at) = candidate.mined_at else {
            return Err(crate::Error::PreconditionUnmet);
        };
        if candidate.hash.is_none() {
            return Err(crate::Error::PreconditionUnmet);
        }
        if !candidate.block_is_valid() {
            return Err(crate::Error::InvalidBlock);
        }

        let id = candidate.id as usize;
        if id > self.blocks.len() {
            return Err(crate::Error::PreconditionUnmet);
        }
        if id == self.blocks.len() {
            if candidate.previous_hash != self.tip_hash() {
                return Err(crate::Error::InvalidBlock);
            }
            self.blocks.push(candidate);
            return Ok(true);
        }

        let incumbent = &self.blocks[id];
        let replace = match incumbent.mined_at {
            None => true,
            Some(incumbent_mined_at) => match candidate_mined_at.cmp(&incumbent_mined_at) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Greater => false,
                std::cmp::Ordering::Equal => candidate.hash < incumbent.hash,
            },
        };
        if replace {
            self.blocks[id] = candidate;
        }
        Ok(replace)
    }

    /// True iff every block links to its predecessor's hash and is itself
    /// valid; the tip need not yet be validated.
    pub fn chain_is_valid(&self) -> bool {
        self.blocks.iter().enumerate().all(|(i, block)| {
            let linked = match i {
                0 => block.previous_hash.is_none(),
                _ => self.blocks[i - 1].hash == block.previous_hash,
            };
            linked && block.block_is_valid()
        })
    }

    /// Every transaction ever committed to the chain, keyed by hash. Unlike
    /// a naive accumulator that never gets returned, this actually yields
    /// the map it built.
    pub fn all_txs(&self) -> BTreeMap<String, Tx> {
        let mut out = BTreeMap::new();
        for block in &self.blocks {
            for (hash, tx) in &block.txs {
                out.insert(hash.clone(), tx.clone());
            }
        }
        out
    }

    pub fn get_txs_by_public_key(&self, pk: &PublicKeyPem) -> Vec<Tx> {
        self.blocks
            .iter()
            .flat_map(|b| b.txs_by_public_key(pk))
            .cloned()
            .collect()
    }

    /// Sum of mining fees collected by `pk` across every block it mined.
    pub fn get_tx_fees_by_public_key(&self, pk: &PublicKeyPem) -> Amount {
        self.blocks
            .iter()
            .filter(|b| b.mined_by.as_ref() == Some(pk))
            .map(|b| b.tx_fees())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::clock::{SystemClock, TestClock};
    use crate::tx::TxKind;
    use ferrochain_crypto::{encode_public_key, generate_keypair, SigningKey};

    fn pem(sk: &SigningKey) -> PublicKeyPem {
        PublicKeyPem(encode_public_key(&sk.verifying_key()).unwrap())
    }

    fn five_balanced_txs() -> Vec<Tx> {
        (0..5)
            .map(|_| {
                let sender = generate_keypair();
                let receiver = generate_keypair();
                let mut tx = Tx::new(
                    TxKind::Normal,
                    Amount::from_whole(1),
                    Amount::from_micros(900_000),
                    Amount::from_micros(100_000),
                    pem(&sender),
                    pem(&receiver),
                );
                tx.sign(&sender);
                tx
            })
            .collect()
    }

    fn mined_block(id: u64, previous_hash: Option<[u8; 32]>, clock: &dyn crate::clock::Clock) -> (Block, SigningKey) {
        let mut block = Block::new_on_top_of(id, previous_hash, clock);
        for tx in five_balanced_txs() {
            block.add_tx(tx);
        }
        let miner = generate_keypair();
        let mined = block.mine(&miner, pem(&miner), clock);
        (mined, miner)
    }

    #[test]
    fn genesis_only_chain_is_valid() {
        let clock = SystemClock;
        let mut chain = Chain::new();
        chain.add_block(Block::genesis(&clock)).unwrap();
        assert!(chain.chain_is_valid());
    }

    #[test]
    fn add_mined_block_rejects_wrong_previous_hash() {
        let clock = SystemClock;
        let mut chain = Chain::new();
        chain.add_block(Block::genesis(&clock)).unwrap();
        let (bad, _miner) = mined_block(1, Some([9u8; 32]), &clock);
        assert!(chain.add_mined_block(bad).is_err());
    }

    #[test]
    fn earlier_mined_at_wins_on_contested_slot() {
        let clock = TestClock::new(0);
        let mut chain = Chain::new();
        chain.add_block(Block::genesis(&clock)).unwrap();
        let genesis_hash = chain.tip_hash();

        clock.advance(1000);
        let (later, _m1) = mined_block(1, genesis_hash, &clock);
        clock.advance(-500);
        let (earlier, _m2) = mined_block(1, genesis_hash, &clock);

        assert!(chain.add_mined_block(later).unwrap());
        assert!(chain.add_mined_block(earlier.clone()).unwrap());
        assert_eq!(chain.get_by_id(1).unwrap().mined_at, earlier.mined_at);
    }

    #[test]
    fn all_txs_returns_every_committed_transaction() {
        let clock = SystemClock;
        let mut chain = Chain::new();
        chain.add_block(Block::genesis(&clock)).unwrap();
        let genesis_hash = chain.tip_hash();
        let (block, _miner) = mined_block(1, genesis_hash, &clock);
        let expected_len = block.txs.len();
        chain.add_mined_block(block).unwrap();

        assert_eq!(chain.all_txs().len(), expected_len);
    }
}
