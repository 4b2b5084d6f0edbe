use crate::{
    BlockDescriptor, BlockId, DfsError, DfsResult, DirectoryListing, FileAttr, LocatedBlocks,
    MetaHandler, ReplicaLocation,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

/// Batch size used when a listing request does not set a limit.
pub const DEFAULT_LIST_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub pool_id: String,
    pub files: Vec<ManifestFile>,
    pub dirs: Vec<ManifestDir>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestFile {
    pub path: String,
    /// Declared size. When absent the sum of block lengths is used.
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub owner: String,
    pub group: String,
    pub mtime: u64,
    pub block_size: u64,
    pub replication: u32,
    pub blocks: Vec<ManifestBlock>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestBlock {
    pub block_id: u64,
    pub generation: u64,
    pub length: u64,
    pub locations: Vec<ReplicaLocation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestDir {
    pub path: String,
    pub mode: Option<u32>,
    pub owner: String,
    pub group: String,
    pub mtime: u64,
}

struct ManifestNode {
    attr: FileAttr,
    blocks: Vec<BlockDescriptor>,
}

/// Metadata service answering from a static manifest. Parent directories of
/// every listed file are implied.
pub struct ManifestMetaService {
    nodes: BTreeMap<String, ManifestNode>,
}

fn normalize_path(path: &str) -> DfsResult<String> {
    if !path.starts_with('/') {
        return Err(DfsError::InvalidArgument(format!(
            "path must be absolute: {}",
            path
        )));
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok("/".to_string());
    }
    Ok(trimmed.to_string())
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

fn child_name<'a>(dir: &str, path: &'a str) -> &'a str {
    let prefix_len = if dir == "/" { 1 } else { dir.len() + 1 };
    &path[prefix_len..]
}

impl ManifestMetaService {
    pub fn from_file<P: AsRef<Path>>(path: P) -> DfsResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DfsError::NotFound(format!("read manifest {} failed: {}", path.display(), e))
        })?;
        let manifest: Manifest = serde_json::from_str(&content).map_err(|e| {
            DfsError::InvalidArgument(format!("parse manifest {} failed: {}", path.display(), e))
        })?;
        Self::from_manifest(manifest)
    }

    pub fn from_manifest(manifest: Manifest) -> DfsResult<Self> {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            ManifestNode {
                attr: FileAttr::new_dir("/"),
                blocks: Vec::new(),
            },
        );

        for dir in manifest.dirs.iter() {
            let path = normalize_path(&dir.path)?;
            let mut attr = FileAttr::new_dir(&path);
            if let Some(mode) = dir.mode {
                attr.mode = mode;
            }
            attr.owner = dir.owner.clone();
            attr.group = dir.group.clone();
            attr.mtime = dir.mtime;
            Self::insert_parents(&mut nodes, &path)?;
            nodes.insert(
                path,
                ManifestNode {
                    attr,
                    blocks: Vec::new(),
                },
            );
        }

        for file in manifest.files.iter() {
            let path = normalize_path(&file.path)?;
            if path == "/" {
                return Err(DfsError::InvalidArgument(
                    "root cannot be a file".to_string(),
                ));
            }

            let mut blocks = Vec::with_capacity(file.blocks.len());
            let mut start = 0u64;
            for block in file.blocks.iter() {
                let mut descriptor = BlockDescriptor::new(
                    start,
                    block.length,
                    BlockId {
                        pool_id: manifest.pool_id.clone(),
                        block_id: block.block_id,
                        generation: block.generation,
                    },
                );
                descriptor.locations = block.locations.clone();
                blocks.push(descriptor);
                start = start.checked_add(block.length).ok_or_else(|| {
                    DfsError::InvalidArgument(format!("block lengths of {} overflow", path))
                })?;
            }

            let size = file.size.unwrap_or(start);
            if size != start {
                warn!(
                    "manifest file {} declares size {} but blocks cover {}",
                    path, size, start
                );
            }

            let mut attr = FileAttr::new_file(&path, size);
            if let Some(mode) = file.mode {
                attr.mode = mode;
            }
            attr.owner = file.owner.clone();
            attr.group = file.group.clone();
            attr.mtime = file.mtime;
            attr.block_size = file.block_size;
            attr.replication = file.replication;

            Self::insert_parents(&mut nodes, &path)?;
            if nodes.get(&path).map(|n| n.attr.is_dir).unwrap_or(false) {
                return Err(DfsError::InvalidArgument(format!(
                    "{} is listed as both file and directory",
                    path
                )));
            }
            nodes.insert(path, ManifestNode { attr, blocks });
        }

        Ok(Self { nodes })
    }

    fn insert_parents(nodes: &mut BTreeMap<String, ManifestNode>, path: &str) -> DfsResult<()> {
        let mut current = parent_of(path);
        while let Some(dir) = current {
            let node = nodes.entry(dir.to_string()).or_insert_with(|| ManifestNode {
                attr: FileAttr::new_dir(dir),
                blocks: Vec::new(),
            });
            if !node.attr.is_dir {
                return Err(DfsError::InvalidArgument(format!(
                    "{} is a file but has child {}",
                    dir, path
                )));
            }
            current = parent_of(dir);
        }
        Ok(())
    }

    // children share the "dir/" prefix, so they come out sorted by name
    fn children<'a>(
        &'a self,
        dir: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a FileAttr)> + 'a {
        let lower = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        self.nodes
            .range::<String, _>((Bound::Excluded(lower.clone()), Bound::Unbounded))
            .take_while(move |(path, _)| path.starts_with(lower.as_str()))
            .filter(move |(path, _)| parent_of(path) == Some(dir))
            .map(move |(path, node)| (child_name(dir, path), &node.attr))
    }
}

#[async_trait]
impl MetaHandler for ManifestMetaService {
    async fn handle_get_file_info(&self, src: &str) -> DfsResult<Option<FileAttr>> {
        let path = normalize_path(src)?;
        Ok(self.nodes.get(&path).map(|node| node.attr.clone()))
    }

    async fn handle_get_block_locations(
        &self,
        src: &str,
        offset: u64,
        length: u64,
    ) -> DfsResult<LocatedBlocks> {
        let path = normalize_path(src)?;
        let node = self
            .nodes
            .get(&path)
            .ok_or_else(|| DfsError::NotFound(src.to_string()))?;
        if node.attr.is_dir {
            return Err(DfsError::InvalidArgument(format!("{} is a directory", src)));
        }

        let end = offset.saturating_add(length);
        let blocks = node
            .blocks
            .iter()
            .filter(|block| block.offset < end && block.end() > offset)
            .cloned()
            .collect();

        Ok(LocatedBlocks {
            file_length: node.attr.size,
            blocks,
        })
    }

    async fn handle_get_listing(
        &self,
        src: &str,
        start_after: &str,
        limit: u32,
    ) -> DfsResult<DirectoryListing> {
        let path = normalize_path(src)?;
        let node = self
            .nodes
            .get(&path)
            .ok_or_else(|| DfsError::NotFound(src.to_string()))?;
        if !node.attr.is_dir {
            return Err(DfsError::InvalidArgument(format!(
                "{} is not a directory",
                src
            )));
        }

        let limit = (if limit == 0 { DEFAULT_LIST_LIMIT } else { limit }) as usize;
        let after: Vec<&FileAttr> = self
            .children(&path)
            .filter(|(name, _)| start_after.is_empty() || *name > start_after)
            .map(|(_, attr)| attr)
            .collect();

        let remaining = after.len().saturating_sub(limit) as u64;
        let entries = after.into_iter().take(limit).cloned().collect();
        Ok(DirectoryListing { entries, remaining })
    }
}
