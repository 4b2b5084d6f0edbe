use crate::{BlockDescriptor, DfsError, DfsResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, Take};

/// Byte stream over one block, starting at the intra-block offset it was
/// opened with. Dropping the stream closes it.
pub type BlockStream = Pin<Box<dyn AsyncRead + Unpin + Send>>;

#[async_trait]
pub trait BlockStreamOpener: Send + Sync {
    /// Open `block` for reading, skipping its first `offset` bytes.
    async fn open_block_stream(&self, block: &BlockDescriptor, offset: u64)
        -> DfsResult<BlockStream>;
}

/// Open `[start, start + size)` of a local file as a reader.
pub async fn open_file_segment<P: AsRef<Path>>(
    path: P,
    start: u64,
    size: u64,
) -> Result<Take<File>, std::io::Error> {
    let mut file = File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(start)).await?;
    Ok(file.take(size))
}

/// Block replicas kept as plain files, one file per block, named after the
/// block id.
pub struct LocalBlockStore {
    root: PathBuf,
}

impl LocalBlockStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn block_path(&self, block_id: u64) -> PathBuf {
        self.root.join(format!("blk_{}", block_id))
    }
}

#[async_trait]
impl BlockStreamOpener for LocalBlockStore {
    async fn open_block_stream(
        &self,
        block: &BlockDescriptor,
        offset: u64,
    ) -> DfsResult<BlockStream> {
        if offset > block.length {
            return Err(DfsError::InvalidArgument(format!(
                "offset {} exceeds length {} of block {}",
                offset, block.length, block.block
            )));
        }

        let path = self.block_path(block.block.block_id);
        debug!(
            "open local block {} at {}, path={}",
            block.block,
            offset,
            path.display()
        );
        let reader = open_file_segment(&path, offset, block.length - offset).await?;
        Ok(Box::pin(reader))
    }
}
