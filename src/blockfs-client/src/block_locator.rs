use blockfs_lib::{BlockDescriptor, DfsError, DfsResult, MetaClient};
use log::{debug, warn};

/// Ordered block layout of one file, as returned by the metadata service.
#[derive(Debug, Clone, Default)]
pub struct BlockLayout {
    blocks: Vec<BlockDescriptor>,
}

impl BlockLayout {
    pub fn new(blocks: Vec<BlockDescriptor>) -> Self {
        Self { blocks }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[BlockDescriptor] {
        &self.blocks
    }

    pub fn get(&self, index: usize) -> Option<&BlockDescriptor> {
        self.blocks.get(index)
    }

    /// First block whose range contains `pos`, with `pos` relative to that
    /// block's start.
    pub fn locate(&self, pos: u64) -> DfsResult<(usize, u64)> {
        self.blocks
            .iter()
            .position(|block| block.contains(pos))
            .map(|index| (index, pos - self.blocks[index].offset))
            .ok_or_else(|| {
                DfsError::MetadataInconsistency(format!("no block covers offset {}", pos))
            })
    }
}

/// Fetches the block layout of one path. Callers cache the result.
pub struct BlockLocator {
    meta: MetaClient,
    path: String,
    size: u64,
}

impl BlockLocator {
    pub fn new(meta: MetaClient, path: &str, size: u64) -> Self {
        Self {
            meta,
            path: path.to_string(),
            size,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn fetch_layout(&self) -> DfsResult<BlockLayout> {
        let located = self
            .meta
            .get_block_locations(&self.path, 0, self.size)
            .await?;
        if located.file_length != self.size {
            warn!(
                "block layout of {} reports length {}, opened with size {}",
                self.path, located.file_length, self.size
            );
        }

        debug!(
            "fetched {} blocks for {} [0, {})",
            located.blocks.len(),
            self.path,
            self.size
        );
        Ok(BlockLayout::new(located.blocks))
    }
}
