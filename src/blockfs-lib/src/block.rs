use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    #[serde(default)]
    pub pool_id: String,
    pub block_id: u64,
    #[serde(default)]
    pub generation: u64,
}

impl BlockId {
    pub fn new(block_id: u64) -> Self {
        Self {
            pool_id: String::new(),
            block_id,
            generation: 0,
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pool_id.is_empty() {
            write!(f, "blk_{}_{}", self.block_id, self.generation)
        } else {
            write!(
                f,
                "{}:blk_{}_{}",
                self.pool_id, self.block_id, self.generation
            )
        }
    }
}

/// A storage node holding one replica of a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaLocation {
    pub node_id: String,
    pub host: String,
    pub port: u16,
}

/// Placement record of one block: the byte range `[offset, offset + length)`
/// of the file it holds and where its replicas live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub offset: u64,
    pub length: u64,
    pub block: BlockId,
    #[serde(default)]
    pub locations: Vec<ReplicaLocation>,
}

impl BlockDescriptor {
    pub fn new(offset: u64, length: u64, block: BlockId) -> Self {
        Self {
            offset,
            length,
            block,
            locations: Vec::new(),
        }
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub fn contains(&self, pos: u64) -> bool {
        self.offset <= pos && pos < self.end()
    }
}

/// Response of a block-location lookup. `blocks` is sorted by offset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatedBlocks {
    pub file_length: u64,
    pub blocks: Vec<BlockDescriptor>,
}
