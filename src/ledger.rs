// Append-only, hash-chained ledger persisted as newline-delimited canonical JSON.
// Linkage is enforced on append; a line that fails to parse on load is skipped.

use crate::block::{Block, GenesisSeed};
use crate::error::{ChainError, Result};
use crate::GENESIS_HASH;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CHAIN_FILE: &str = "chain.jsonl";

#[derive(Debug)]
pub struct Ledger {
    path: Option<PathBuf>,
    blocks: Vec<Block>,
    skipped_lines: usize,
    // Log ends in a partial line; the next write starts on a fresh one.
    torn_tail: bool,
}

impl Ledger {
    /// Ledger with no backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            blocks: Vec::new(),
            skipped_lines: 0,
            torn_tail: false,
        }
    }

    /// Open (or create) `<data_dir>/chain.jsonl` and load every parseable line.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        let path = data_dir.as_ref().join(CHAIN_FILE);
        let mut ledger = Self {
            path: Some(path),
            blocks: Vec::new(),
            skipped_lines: 0,
            torn_tail: false,
        };
        ledger.load()?;
        Ok(ledger)
    }

    fn load(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let data = fs::read(path)?;
        self.torn_tail = !data.is_empty() && !data.ends_with(b"\n");
        for (line_num, raw) in data.split(|b| *b == b'\n').enumerate() {
            let text = String::from_utf8_lossy(raw);
            if text.trim().is_empty() {
                continue;
            }
            match Block::from_line(&text) {
                Ok(block) => self.blocks.push(block),
                Err(source) => {
                    let err = ChainError::MalformedRecord {
                        line: line_num + 1,
                        source,
                    };
                    tracing::warn!(error = %err, "skipping ledger line");
                    self.skipped_lines += 1;
                }
            }
        }
        tracing::info!(
            blocks = self.blocks.len(),
            skipped = self.skipped_lines,
            "ledger loaded"
        );
        Ok(())
    }

    /// Seed the sentinel genesis block if (and only if) the ledger is empty.
    /// Returns whether a block was written.
    pub fn seed_genesis(&mut self, seed: &GenesisSeed) -> Result<bool> {
        if !self.blocks.is_empty() {
            return Ok(false);
        }
        let genesis = Block::genesis(seed);
        self.persist(&genesis)?;
        self.blocks.push(genesis);
        tracing::info!(owner = %seed.owner, "seeded genesis block");
        Ok(true)
    }

    /// Read a genesis descriptor (`{"owner": .., "epoch": ..}`) from a JSON file.
    pub fn read_genesis_seed<P: AsRef<Path>>(path: P) -> Result<GenesisSeed> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn last_hash(&self) -> &str {
        self.blocks
            .last()
            .map(|b| b.hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    /// Number of stored blocks, genesis included.
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Index the next block must carry.
    pub fn next_index(&self) -> u64 {
        self.blocks.last().map(|b| b.index + 1).unwrap_or(1)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: u64) -> Option<&Block> {
        self.blocks.iter().find(|b| b.index == index)
    }

    /// Lines dropped during load.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Append `block` if it links to the current tip.
    ///
    /// `Ok(false)` means a linkage mismatch: nothing was written or stored.
    /// The log line is written before the in-memory push.
    pub fn append(&mut self, block: Block) -> Result<bool> {
        if block.prev_hash != self.last_hash() {
            tracing::debug!(
                index = block.index,
                prev_hash = %block.prev_hash,
                tip = %self.last_hash(),
                "append rejected: prev_hash mismatch"
            );
            return Ok(false);
        }
        self.persist(&block)?;
        self.blocks.push(block);
        Ok(true)
    }

    fn persist(&mut self, block: &Block) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut line = block.to_line()?;
        line.push('\n');
        if self.torn_tail {
            line.insert(0, '\n');
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        self.torn_tail = false;
        Ok(())
    }

    /// Re-check every hash and every linkage. The genesis sentinel is exempt from
    /// hash recomputation.
    pub fn validate_chain(&self) -> Result<()> {
        let mut prev: Option<&Block> = None;
        for block in &self.blocks {
            if !block.is_genesis() && !block.verify() {
                return Err(ChainError::HashMismatch {
                    index: block.index,
                    expected: block.compute_hash(),
                    actual: block.hash.clone(),
                });
            }
            let expected_prev = prev.map(|p| p.hash.as_str()).unwrap_or(if block.is_genesis() {
                ""
            } else {
                GENESIS_HASH
            });
            if block.prev_hash != expected_prev {
                return Err(ChainError::HashMismatch {
                    index: block.index,
                    expected: expected_prev.to_string(),
                    actual: block.prev_hash.clone(),
                });
            }
            prev = Some(block);
        }
        Ok(())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::in_memory()
    }
}
