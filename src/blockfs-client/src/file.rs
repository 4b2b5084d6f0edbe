use crate::block_locator::BlockLocator;
use crate::block_mux::{BlockStreamMux, MuxPhase};
use crate::dir_cursor::DirCursor;
use blockfs_lib::{BlockStreamOpener, DfsError, DfsResult, FileAttr, ListResult, MetaClient};
use log::debug;
use std::io::SeekFrom;
use std::sync::Arc;

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Read-only handle on one remote file or directory.
///
/// The attributes are captured once at open. File bytes are pulled through a
/// [`BlockStreamMux`] and directory entries through a [`DirCursor`]; neither
/// talks to the network before its first use.
pub struct BlockFile {
    name: String,
    attr: FileAttr,
    mux: BlockStreamMux,
    cursor: Option<DirCursor>,
}

impl BlockFile {
    pub async fn open(
        meta: MetaClient,
        opener: Arc<dyn BlockStreamOpener>,
        name: &str,
    ) -> DfsResult<Self> {
        let attr = meta.get_file_info(name).await?;
        debug!("opened {}: size {}, dir {}", name, attr.size, attr.is_dir);

        let cursor = if attr.is_dir {
            Some(DirCursor::new(meta.clone(), name))
        } else {
            None
        };
        let mux = BlockStreamMux::new(BlockLocator::new(meta, name, attr.size), opener, attr.size);

        Ok(Self {
            name: name.to_string(),
            attr,
            mux,
            cursor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stat(&self) -> &FileAttr {
        &self.attr
    }

    pub fn size(&self) -> u64 {
        self.attr.size
    }

    pub fn is_dir(&self) -> bool {
        self.attr.is_dir
    }

    pub fn position(&self) -> u64 {
        self.mux.position()
    }

    pub fn phase(&self) -> MuxPhase {
        self.mux.phase()
    }

    pub fn seek(&mut self, pos: SeekFrom) -> DfsResult<u64> {
        self.mux.seek(pos)
    }

    /// `whence` is one of [`SEEK_SET`], [`SEEK_CUR`], [`SEEK_END`].
    pub fn seek_raw(&mut self, offset: i64, whence: i32) -> DfsResult<u64> {
        let pos = match whence {
            SEEK_SET => {
                if offset < 0 {
                    return Err(DfsError::InvalidArgument(format!(
                        "negative seek offset {}",
                        offset
                    )));
                }
                SeekFrom::Start(offset as u64)
            }
            SEEK_CUR => SeekFrom::Current(offset),
            SEEK_END => SeekFrom::End(offset),
            _ => {
                return Err(DfsError::InvalidArgument(format!(
                    "invalid whence {}",
                    whence
                )))
            }
        };
        self.mux.seek(pos)
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> DfsResult<usize> {
        self.mux.read(buf).await
    }

    /// Seek to `offset`, then read once. Moves the handle's position.
    pub async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> DfsResult<usize> {
        self.mux.seek(SeekFrom::Start(offset))?;
        self.mux.read(buf).await
    }

    /// Append everything from the current position to the end of the file.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> DfsResult<usize> {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let mut total = 0;
        loop {
            match self.mux.read(&mut chunk).await {
                Ok(n) => {
                    out.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(DfsError::Eof) => return Ok(total),
                Err(err) => return Err(err),
            }
        }
    }

    pub fn close(&mut self) -> DfsResult<()> {
        self.mux.close_stream();
        Ok(())
    }

    pub fn chmod(&mut self, _mode: u32) -> DfsResult<()> {
        Ok(())
    }

    pub fn chown(&mut self, _uid: u32, _gid: u32) -> DfsResult<()> {
        Ok(())
    }

    /// See [`DirCursor::get_page`]. Fails with `InvalidArgument` on a file.
    pub async fn readdir(&mut self, n: i32) -> ListResult<FileAttr> {
        let name = &self.name;
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| DfsError::InvalidArgument(format!("{} is not a directory", name)))?;
        cursor.get_page(n).await
    }

    pub async fn readdirnames(&mut self, n: i32) -> ListResult<String> {
        let to_name = |attr: FileAttr| attr.file_name().to_string();
        match self.readdir(n).await {
            Ok(entries) => Ok(entries.into_iter().map(to_name).collect()),
            Err(partial) => Err(partial.map(to_name)),
        }
    }
}
