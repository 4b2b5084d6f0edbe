use crate::block_locator::{BlockLayout, BlockLocator};
use blockfs_lib::{BlockStream, BlockStreamOpener, DfsError, DfsResult};
use log::{debug, warn};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Observable progress of a [`BlockStreamMux`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxPhase {
    /// Block layout not fetched yet.
    Unresolved,
    /// Layout cached, no block stream open.
    Resolved,
    /// Layout cached and one block stream open at the current position.
    StreamOpen,
    /// Position is at the end of the file. Reads return EOF without I/O.
    AtEnd,
}

struct OpenBlock {
    layout: Arc<BlockLayout>,
    block_index: usize,
    stream: BlockStream,
}

enum MuxState {
    Unresolved,
    Resolved(Arc<BlockLayout>),
    StreamOpen(OpenBlock),
}

/// Presents the blocks of one file as a single seekable byte stream.
///
/// The layout is fetched on the first read that needs it and kept for the
/// life of the mux. At most one block stream is open at a time; a stream
/// that returns zero bytes is treated as an exhausted block and replaced by
/// the stream of the block covering the current position. End of file is
/// decided only by comparing the position with `size`.
pub struct BlockStreamMux {
    locator: BlockLocator,
    opener: Arc<dyn BlockStreamOpener>,
    size: u64,
    position: u64,
    state: MuxState,
}

impl BlockStreamMux {
    pub fn new(locator: BlockLocator, opener: Arc<dyn BlockStreamOpener>, size: u64) -> Self {
        Self {
            locator,
            opener,
            size,
            position: 0,
            state: MuxState::Unresolved,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn phase(&self) -> MuxPhase {
        if self.position >= self.size {
            return MuxPhase::AtEnd;
        }
        match self.state {
            MuxState::Unresolved => MuxPhase::Unresolved,
            MuxState::Resolved(_) => MuxPhase::Resolved,
            MuxState::StreamOpen(_) => MuxPhase::StreamOpen,
        }
    }

    pub fn layout(&self) -> Option<&BlockLayout> {
        match &self.state {
            MuxState::Unresolved => None,
            MuxState::Resolved(layout) => Some(layout.as_ref()),
            MuxState::StreamOpen(open) => Some(open.layout.as_ref()),
        }
    }

    fn calc_seek_target(&self, pos: SeekFrom) -> DfsResult<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.size as i128 + delta as i128,
        };

        if target < 0 || target > self.size as i128 {
            return Err(DfsError::InvalidArgument(format!(
                "seek target {} out of range [0, {}]",
                target, self.size
            )));
        }

        Ok(target as u64)
    }

    /// Move to `pos` and drop any open block stream. Never does I/O.
    pub fn seek(&mut self, pos: SeekFrom) -> DfsResult<u64> {
        let target = self.calc_seek_target(pos)?;
        self.position = target;
        self.close_stream();
        Ok(self.position)
    }

    /// Drop the open block stream, keeping the cached layout.
    pub fn close_stream(&mut self) {
        if let MuxState::StreamOpen(open) = &self.state {
            let layout = open.layout.clone();
            self.state = MuxState::Resolved(layout);
        }
    }

    async fn ensure_layout(&mut self) -> DfsResult<Arc<BlockLayout>> {
        match &self.state {
            MuxState::Resolved(layout) => return Ok(layout.clone()),
            MuxState::StreamOpen(open) => return Ok(open.layout.clone()),
            MuxState::Unresolved => {}
        }

        let layout = Arc::new(self.locator.fetch_layout().await?);
        self.state = MuxState::Resolved(layout.clone());
        Ok(layout)
    }

    async fn open_block(&self, layout: &Arc<BlockLayout>) -> DfsResult<OpenBlock> {
        let (block_index, block_offset) = layout.locate(self.position)?;
        let block = &layout.blocks()[block_index];
        debug!(
            "open block {} of {} at {} (file offset {})",
            block.block,
            self.locator.path(),
            block_offset,
            self.position
        );

        let stream = self.opener.open_block_stream(block, block_offset).await?;
        Ok(OpenBlock {
            layout: layout.clone(),
            block_index,
            stream,
        })
    }

    /// Read up to `buf.len()` bytes at the current position.
    ///
    /// Returns as soon as one block stream yields data, so a single call never
    /// returns bytes from two blocks. `DfsError::Eof` once the position has
    /// reached the file size.
    pub async fn read(&mut self, buf: &mut [u8]) -> DfsResult<usize> {
        if self.position >= self.size {
            self.close_stream();
            return Err(DfsError::Eof);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let layout = self.ensure_layout().await?;
        // while the read is in flight the state only holds the layout
        let mut open =
            match std::mem::replace(&mut self.state, MuxState::Resolved(layout.clone())) {
                MuxState::StreamOpen(open) => open,
                _ => self.open_block(&layout).await?,
            };

        let mut attempts_left = layout.len().saturating_sub(open.block_index);
        loop {
            match open.stream.read(buf).await {
                Ok(0) => {
                    let exhausted = open.block_index;
                    drop(open);
                    if attempts_left == 0 {
                        return Err(DfsError::MetadataInconsistency(format!(
                            "block streams of {} ended at offset {} before size {}",
                            self.locator.path(),
                            self.position,
                            self.size
                        )));
                    }
                    attempts_left -= 1;
                    debug!(
                        "block {} of {} exhausted at offset {}",
                        exhausted,
                        self.locator.path(),
                        self.position
                    );
                    open = self.open_block(&layout).await?;
                }
                Ok(n) => {
                    // offset never passes size, even if a stream over-delivers
                    let n = n.min((self.size - self.position) as usize);
                    self.position += n as u64;
                    if self.position < self.size {
                        self.state = MuxState::StreamOpen(open);
                    }
                    return Ok(n);
                }
                Err(err) => {
                    warn!(
                        "read block {} of {} at offset {} failed: {}",
                        open.block_index,
                        self.locator.path(),
                        self.position,
                        err
                    );
                    return Err(DfsError::Stream(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixture::ClusterBuilder;

    fn two_block_mux() -> (BlockStreamMux, crate::test_fixture::TestCluster) {
        let cluster = ClusterBuilder::new()
            .add_file("/f", 150, &[100, 50])
            .build();
        let mux = BlockStreamMux::new(
            BlockLocator::new(cluster.meta_client(), "/f", 150),
            cluster.blocks.clone(),
            150,
        );
        (mux, cluster)
    }

    #[tokio::test]
    async fn test_phase_transitions() {
        let (mut mux, _cluster) = two_block_mux();
        assert_eq!(mux.phase(), MuxPhase::Unresolved);
        assert!(mux.layout().is_none());

        let mut buf = [0u8; 40];
        assert_eq!(mux.read(&mut buf).await.unwrap(), 40);
        assert_eq!(mux.phase(), MuxPhase::StreamOpen);
        assert_eq!(mux.layout().unwrap().len(), 2);

        mux.seek(SeekFrom::Current(0)).unwrap();
        assert_eq!(mux.phase(), MuxPhase::Resolved);

        mux.seek(SeekFrom::Start(140)).unwrap();
        let mut tail = [0u8; 64];
        assert_eq!(mux.read(&mut tail).await.unwrap(), 10);
        assert_eq!(mux.phase(), MuxPhase::AtEnd);
        assert!(mux.read(&mut tail).await.unwrap_err().is_eof());

        mux.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(mux.phase(), MuxPhase::Resolved);
    }

    #[tokio::test]
    async fn test_seek_targets() {
        let (mut mux, _cluster) = two_block_mux();
        assert_eq!(mux.seek(SeekFrom::End(-10)).unwrap(), 140);
        assert_eq!(mux.seek(SeekFrom::Current(-40)).unwrap(), 100);
        assert_eq!(mux.seek(SeekFrom::End(0)).unwrap(), 150);

        assert!(mux.seek(SeekFrom::Current(1)).unwrap_err().is_invalid_argument());
        assert!(mux.seek(SeekFrom::End(-151)).unwrap_err().is_invalid_argument());
        assert!(mux
            .seek(SeekFrom::Current(i64::MIN))
            .unwrap_err()
            .is_invalid_argument());
        assert_eq!(mux.position(), 150);
    }

    #[tokio::test]
    async fn test_empty_buffer_does_no_io() {
        let (mut mux, cluster) = two_block_mux();
        let mut empty = [0u8; 0];
        assert_eq!(mux.read(&mut empty).await.unwrap(), 0);
        assert_eq!(mux.phase(), MuxPhase::Unresolved);
        assert_eq!(cluster.meta.block_calls(), 0);
        assert_eq!(cluster.blocks.opens(), 0);
    }
}
