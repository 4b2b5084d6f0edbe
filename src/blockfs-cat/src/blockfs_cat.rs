use blockfs_client::{BlockFile, BlockFsClient};
use blockfs_lib::{
    DfsError, DfsResult, FileAttr, LocalBlockStore, ManifestMetaService, MetaClient,
};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::{SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;

pub const DEFAULT_BLOCKFS_CONFIG_PATH: &str = "/opt/blockfs/etc/blockfs.json";
pub const DEFAULT_MANIFEST_PATH: &str = "/opt/blockfs/etc/manifest.json";
pub const DEFAULT_BLOCK_DIR: &str = "/opt/blockfs/blocks";
pub const DEFAULT_PAGE_SIZE: i32 = 100;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct BlockFsCatConfig {
    #[serde(alias = "manifest", alias = "meta_manifest")]
    pub manifest_path: PathBuf,
    #[serde(alias = "blocks_dir", alias = "block_root")]
    pub block_dir: PathBuf,
    #[serde(alias = "list_page_size")]
    pub page_size: i32,
}

impl Default for BlockFsCatConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
            block_dir: PathBuf::from(DEFAULT_BLOCK_DIR),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockFsCatRunOptions {
    pub path: String,
    pub config_path: Option<PathBuf>,
    pub offset: u64,
    pub list: bool,
    pub page_size: Option<i32>,
}

impl BlockFsCatRunOptions {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            config_path: None,
            offset: 0,
            list: false,
            page_size: None,
        }
    }
}

fn output_error(err: std::io::Error) -> DfsError {
    DfsError::Io(format!("write output failed: {}", err))
}

pub(crate) fn read_json_config<T: DeserializeOwned>(path: &Path) -> DfsResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DfsError::NotFound(format!("read {} failed: {}", path.display(), e)))?;
    serde_json::from_str::<T>(&content)
        .map_err(|e| DfsError::InvalidArgument(format!("parse {} failed: {}", path.display(), e)))
}

/// An explicit config path must exist; a missing default config falls back
/// to built-in defaults.
pub(crate) fn load_config(config_path: Option<&Path>) -> DfsResult<BlockFsCatConfig> {
    if let Some(path) = config_path {
        return read_json_config(path);
    }

    let default_path = Path::new(DEFAULT_BLOCKFS_CONFIG_PATH);
    if default_path.exists() {
        read_json_config(default_path)
    } else {
        info!(
            "config {} not found, using defaults",
            DEFAULT_BLOCKFS_CONFIG_PATH
        );
        Ok(BlockFsCatConfig::default())
    }
}

pub(crate) fn open_client(config: &BlockFsCatConfig) -> DfsResult<BlockFsClient> {
    let meta = ManifestMetaService::from_file(&config.manifest_path)?;
    let store = LocalBlockStore::new(config.block_dir.clone());
    info!(
        "serving {} from blocks in {}",
        config.manifest_path.display(),
        config.block_dir.display()
    );
    Ok(BlockFsClient::new(
        MetaClient::new_in_process(Arc::new(meta)),
        Arc::new(store),
    ))
}

pub(crate) fn format_entry(attr: &FileAttr) -> String {
    format!(
        "{}{:04o} {:>8} {:>8} {:>12} {}",
        if attr.is_dir { 'd' } else { '-' },
        attr.mode,
        attr.owner,
        attr.group,
        attr.size,
        attr.file_name()
    )
}

/// Copy the file from `offset` to its end into `out`. Returns bytes written.
pub(crate) async fn cat_file<W: Write>(
    client: &BlockFsClient,
    path: &str,
    offset: u64,
    out: &mut W,
) -> DfsResult<u64> {
    let mut file = client.open(path).await?;
    if file.is_dir() {
        return Err(DfsError::InvalidArgument(format!(
            "{} is a directory, use --ls",
            path
        )));
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(DfsError::Eof) => break,
            Err(err) => return Err(err),
        };
        out.write_all(&buf[..n]).map_err(output_error)?;
        written += n as u64;
    }
    out.flush().map_err(output_error)?;

    info!("cat {} from {}: {} bytes", path, offset, written);
    Ok(written)
}

async fn write_pages<W: Write>(dir: &mut BlockFile, page_size: i32, out: &mut W) -> DfsResult<u64> {
    let mut listed = 0u64;
    loop {
        let (entries, outcome) = match dir.readdir(page_size).await {
            Ok(entries) => (entries, Ok(())),
            Err(partial) => (partial.entries, Err(partial.error)),
        };
        for entry in entries.iter() {
            writeln!(out, "{}", format_entry(entry)).map_err(output_error)?;
        }
        listed += entries.len() as u64;

        match outcome {
            Err(DfsError::Eof) => return Ok(listed),
            Err(err) => {
                warn!(
                    "listing {} stopped after {} entries: {}",
                    dir.name(),
                    listed,
                    err
                );
                return Err(err);
            }
            Ok(()) if page_size <= 0 => return Ok(listed),
            Ok(()) => {}
        }
    }
}

/// List `path` into `out`, one line per entry, fetching `page_size` entries
/// per page (`<= 0` for a single full listing). A file lists as itself.
pub(crate) async fn list_dir<W: Write>(
    client: &BlockFsClient,
    path: &str,
    page_size: i32,
    out: &mut W,
) -> DfsResult<u64> {
    let mut dir = client.open(path).await?;
    if !dir.is_dir() {
        writeln!(out, "{}", format_entry(dir.stat())).map_err(output_error)?;
        return Ok(1);
    }

    let listed = write_pages(&mut dir, page_size, out).await?;
    out.flush().map_err(output_error)?;
    info!("listed {}: {} entries", path, listed);
    Ok(listed)
}

pub(crate) async fn execute<W: Write>(
    options: &BlockFsCatRunOptions,
    config: &BlockFsCatConfig,
    out: &mut W,
) -> DfsResult<u64> {
    let client = open_client(config)?;
    if options.list {
        let page_size = options.page_size.unwrap_or(config.page_size);
        list_dir(&client, &options.path, page_size, out).await
    } else {
        cat_file(&client, &options.path, options.offset, out).await
    }
}

pub fn run_blockfs_cat(options: BlockFsCatRunOptions) -> DfsResult<()> {
    let config = load_config(options.config_path.as_deref())?;
    let runtime = Runtime::new()
        .map_err(|e| DfsError::Io(format!("create tokio runtime failed: {}", e)))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    runtime.block_on(execute(&options, &config, &mut out))?;
    Ok(())
}
