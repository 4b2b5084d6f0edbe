use crate::file::BlockFile;
use blockfs_lib::{BlockStreamOpener, DfsResult, FileAttr, ListResult, MetaClient};
use std::sync::Arc;

/// Entry point for reading a block filesystem: one metadata client plus the
/// opener for block streams, shared by every handle it creates.
#[derive(Clone)]
pub struct BlockFsClient {
    meta: MetaClient,
    opener: Arc<dyn BlockStreamOpener>,
}

impl BlockFsClient {
    pub fn new(meta: MetaClient, opener: Arc<dyn BlockStreamOpener>) -> Self {
        Self { meta, opener }
    }

    pub fn meta(&self) -> &MetaClient {
        &self.meta
    }

    pub async fn open(&self, path: &str) -> DfsResult<BlockFile> {
        BlockFile::open(self.meta.clone(), self.opener.clone(), path).await
    }

    pub async fn stat(&self, path: &str) -> DfsResult<FileAttr> {
        self.meta.get_file_info(path).await
    }

    /// Every entry of the directory at `path`.
    pub async fn read_dir(&self, path: &str) -> ListResult<FileAttr> {
        let mut dir = self.open(path).await?;
        dir.readdir(0).await
    }

    /// Whole content of the file at `path`.
    pub async fn read_file(&self, path: &str) -> DfsResult<Vec<u8>> {
        let mut file = self.open(path).await?;
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data).await?;
        Ok(data)
    }
}
