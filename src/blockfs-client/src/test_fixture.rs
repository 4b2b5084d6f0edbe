//! In-memory metadata service and block store with call counters and fault
//! injection, shared by the unit tests of this crate.

use crate::BlockFsClient;
use async_trait::async_trait;
use blockfs_lib::{
    BlockDescriptor, BlockId, BlockStream, BlockStreamOpener, DfsError, DfsResult,
    DirectoryListing, FileAttr, LocatedBlocks, MetaClient, MetaHandler,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Deterministic file content, distinct at every offset within 251 bytes.
pub(crate) fn pattern(len: u64) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

pub(crate) struct MemMeta {
    nodes: BTreeMap<String, FileAttr>,
    layouts: HashMap<String, Vec<BlockDescriptor>>,
    denied: HashSet<String>,
    fail_block_locations: bool,
    listing_batch: u32,
    fail_listing_call: Option<usize>,
    info_calls: AtomicUsize,
    block_calls: AtomicUsize,
    listing_calls: AtomicUsize,
}

impl MemMeta {
    pub(crate) fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetaHandler for MemMeta {
    async fn handle_get_file_info(&self, src: &str) -> DfsResult<Option<FileAttr>> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if self.denied.contains(src) {
            return Err(DfsError::PermissionDenied(src.to_string()));
        }
        Ok(self.nodes.get(src).cloned())
    }

    async fn handle_get_block_locations(
        &self,
        src: &str,
        _offset: u64,
        _length: u64,
    ) -> DfsResult<LocatedBlocks> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_block_locations {
            return Err(DfsError::Transport("namenode unreachable".to_string()));
        }
        let attr = self
            .nodes
            .get(src)
            .ok_or_else(|| DfsError::NotFound(src.to_string()))?;
        Ok(LocatedBlocks {
            file_length: attr.size,
            blocks: self.layouts.get(src).cloned().unwrap_or_default(),
        })
    }

    async fn handle_get_listing(
        &self,
        src: &str,
        start_after: &str,
        limit: u32,
    ) -> DfsResult<DirectoryListing> {
        let call = self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing_call == Some(call) {
            return Err(DfsError::Transport(format!(
                "listing call {} dropped",
                call
            )));
        }

        let mut batch = if limit == 0 { usize::MAX } else { limit as usize };
        if self.listing_batch > 0 {
            batch = batch.min(self.listing_batch as usize);
        }

        let after: Vec<&FileAttr> = self
            .nodes
            .iter()
            .filter(|(path, _)| parent_of(path) == Some(src))
            .filter(|(_, attr)| start_after.is_empty() || attr.file_name() > start_after)
            .map(|(_, attr)| attr)
            .collect();
        let remaining = after.len().saturating_sub(batch) as u64;
        Ok(DirectoryListing {
            entries: after.into_iter().take(batch).cloned().collect(),
            remaining,
        })
    }
}

struct MemBlockStream {
    data: Arc<Vec<u8>>,
    pos: usize,
    end: usize,
    max_read: usize,
    broken: bool,
}

impl AsyncRead for MemBlockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.broken {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "replica connection reset",
            )));
        }

        let n = (this.end - this.pos).min(buf.remaining()).min(this.max_read);
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

pub(crate) struct MemBlocks {
    blocks: HashMap<u64, Arc<Vec<u8>>>,
    broken: HashSet<u64>,
    missing: HashSet<u64>,
    truncated: HashMap<u64, usize>,
    max_read: usize,
    opens: Mutex<Vec<(u64, u64)>>,
}

impl MemBlocks {
    pub(crate) fn opens(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    /// `(block_id, intra-block offset)` of every open, in order.
    pub(crate) fn open_log(&self) -> Vec<(u64, u64)> {
        self.opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockStreamOpener for MemBlocks {
    async fn open_block_stream(
        &self,
        block: &BlockDescriptor,
        offset: u64,
    ) -> DfsResult<BlockStream> {
        let id = block.block.block_id;
        self.opens.lock().unwrap().push((id, offset));
        if self.missing.contains(&id) {
            return Err(DfsError::Transport(format!("no live replica of block {}", id)));
        }

        let data = self.blocks.get(&id).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no replica of {}", id))
        })?;
        if offset as usize > data.len() {
            return Err(DfsError::InvalidArgument(format!(
                "offset {} past block {}",
                offset, id
            )));
        }

        let end = self.truncated.get(&id).copied().unwrap_or(data.len());
        Ok(Box::pin(MemBlockStream {
            data,
            pos: (offset as usize).min(end),
            end,
            max_read: self.max_read,
            broken: self.broken.contains(&id),
        }))
    }
}

pub(crate) struct TestCluster {
    pub(crate) meta: Arc<MemMeta>,
    pub(crate) blocks: Arc<MemBlocks>,
    pub(crate) contents: HashMap<String, Vec<u8>>,
}

impl TestCluster {
    pub(crate) fn meta_client(&self) -> MetaClient {
        MetaClient::new_in_process(self.meta.clone())
    }

    pub(crate) fn client(&self) -> BlockFsClient {
        BlockFsClient::new(self.meta_client(), self.blocks.clone())
    }

    pub(crate) fn content(&self, path: &str) -> &[u8] {
        &self.contents[path]
    }
}

pub(crate) struct ClusterBuilder {
    meta: MemMeta,
    blocks: MemBlocks,
    contents: HashMap<String, Vec<u8>>,
    next_block_id: u64,
}

impl ClusterBuilder {
    pub(crate) fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), FileAttr::new_dir("/"));
        Self {
            meta: MemMeta {
                nodes,
                layouts: HashMap::new(),
                denied: HashSet::new(),
                fail_block_locations: false,
                listing_batch: 0,
                fail_listing_call: None,
                info_calls: AtomicUsize::new(0),
                block_calls: AtomicUsize::new(0),
                listing_calls: AtomicUsize::new(0),
            },
            blocks: MemBlocks {
                blocks: HashMap::new(),
                broken: HashSet::new(),
                missing: HashSet::new(),
                truncated: HashMap::new(),
                max_read: usize::MAX,
                opens: Mutex::new(Vec::new()),
            },
            contents: HashMap::new(),
            next_block_id: 1,
        }
    }

    fn add_parents(&mut self, path: &str) {
        let mut current = parent_of(path);
        while let Some(dir) = current {
            self.meta
                .nodes
                .entry(dir.to_string())
                .or_insert_with(|| FileAttr::new_dir(dir));
            current = parent_of(dir);
        }
    }

    pub(crate) fn add_dir(mut self, path: &str) -> Self {
        self.add_parents(path);
        self.meta
            .nodes
            .insert(path.to_string(), FileAttr::new_dir(path));
        self
    }

    /// File of `size` pattern bytes split into blocks of `block_sizes`. The
    /// blocks may cover less or more than `size`.
    pub(crate) fn add_file(mut self, path: &str, size: u64, block_sizes: &[u64]) -> Self {
        let total: u64 = block_sizes.iter().sum();
        let data = pattern(size.max(total));

        let mut layout = Vec::with_capacity(block_sizes.len());
        let mut start = 0u64;
        for length in block_sizes.iter().copied() {
            let id = self.next_block_id;
            self.next_block_id += 1;
            let bytes = data[start as usize..(start + length) as usize].to_vec();
            self.blocks.blocks.insert(id, Arc::new(bytes));
            layout.push(BlockDescriptor::new(start, length, BlockId::new(id)));
            start += length;
        }

        self.add_parents(path);
        self.meta
            .nodes
            .insert(path.to_string(), FileAttr::new_file(path, size));
        self.meta.layouts.insert(path.to_string(), layout);
        self.contents
            .insert(path.to_string(), data[..size as usize].to_vec());
        self
    }

    fn block_id(&self, path: &str, index: usize) -> u64 {
        self.meta.layouts[path][index].block.block_id
    }

    /// Leave block `index` out of the layout reported for `path`.
    pub(crate) fn omit_block(mut self, path: &str, index: usize) -> Self {
        if let Some(layout) = self.meta.layouts.get_mut(path) {
            layout.remove(index);
        }
        self
    }

    pub(crate) fn broken_block(mut self, path: &str, index: usize) -> Self {
        let id = self.block_id(path, index);
        self.blocks.broken.insert(id);
        self
    }

    /// Opening block `index` fails as if no replica answered.
    pub(crate) fn missing_replica(mut self, path: &str, index: usize) -> Self {
        let id = self.block_id(path, index);
        self.blocks.missing.insert(id);
        self
    }

    /// Streams of block `index` end after `keep` bytes.
    pub(crate) fn truncate_block(mut self, path: &str, index: usize, keep: usize) -> Self {
        let id = self.block_id(path, index);
        self.blocks.truncated.insert(id, keep);
        self
    }

    /// Every block layout request fails with `Transport`.
    pub(crate) fn fail_block_locations(mut self) -> Self {
        self.meta.fail_block_locations = true;
        self
    }

    pub(crate) fn deny(mut self, path: &str) -> Self {
        self.meta.denied.insert(path.to_string());
        self
    }

    /// Every block stream read returns at most `max_read` bytes.
    pub(crate) fn max_read(mut self, max_read: usize) -> Self {
        self.blocks.max_read = max_read;
        self
    }

    pub(crate) fn listing_batch(mut self, batch: u32) -> Self {
        self.meta.listing_batch = batch;
        self
    }

    /// The listing call with this zero-based index fails.
    pub(crate) fn fail_listing_call(mut self, call: usize) -> Self {
        self.meta.fail_listing_call = Some(call);
        self
    }

    pub(crate) fn build(self) -> TestCluster {
        TestCluster {
            meta: Arc::new(self.meta),
            blocks: Arc::new(self.blocks),
            contents: self.contents,
        }
    }
}
