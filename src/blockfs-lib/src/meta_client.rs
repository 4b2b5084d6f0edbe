/// ------------------------------
/// Metadata protocol: file info, block locations, directory listing
/// ------------------------------
use crate::{DfsError, DfsResult, FileAttr, LocatedBlocks};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const METHOD_GET_FILE_INFO: &str = "get_file_info";
pub const METHOD_GET_BLOCK_LOCATIONS: &str = "get_block_locations";
pub const METHOD_GET_LISTING: &str = "get_listing";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileInfoReq {
    pub src: String,
}

impl GetFileInfoReq {
    pub fn new(src: &str) -> Self {
        Self {
            src: src.to_string(),
        }
    }

    pub fn from_json(value: Value) -> DfsResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            DfsError::InvalidArgument(format!("Failed to parse GetFileInfoReq: {}", e))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlockLocationsReq {
    pub src: String,
    pub offset: u64,
    pub length: u64,
}

impl GetBlockLocationsReq {
    pub fn new(src: &str, offset: u64, length: u64) -> Self {
        Self {
            src: src.to_string(),
            offset,
            length,
        }
    }

    pub fn from_json(value: Value) -> DfsResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            DfsError::InvalidArgument(format!("Failed to parse GetBlockLocationsReq: {}", e))
        })
    }
}

/// `start_after` is the name of the last entry already seen, empty to start
/// from the beginning. `limit == 0` lets the service pick its batch size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetListingReq {
    pub src: String,
    #[serde(default)]
    pub start_after: String,
    #[serde(default)]
    pub limit: u32,
}

impl GetListingReq {
    pub fn new(src: &str, start_after: &str, limit: u32) -> Self {
        Self {
            src: src.to_string(),
            start_after: start_after.to_string(),
            limit,
        }
    }

    pub fn from_json(value: Value) -> DfsResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            DfsError::InvalidArgument(format!("Failed to parse GetListingReq: {}", e))
        })
    }
}

/// One batch of a directory listing. `remaining` counts the entries left
/// after this batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub entries: Vec<FileAttr>,
    #[serde(default)]
    pub remaining: u64,
}

// ========== Kernel : MetaHandler ==========
#[async_trait]
pub trait MetaHandler: Send + Sync {
    async fn handle_get_file_info(&self, src: &str) -> DfsResult<Option<FileAttr>>;

    async fn handle_get_block_locations(
        &self,
        src: &str,
        offset: u64,
        length: u64,
    ) -> DfsResult<LocatedBlocks>;

    async fn handle_get_listing(
        &self,
        src: &str,
        start_after: &str,
        limit: u32,
    ) -> DfsResult<DirectoryListing>;
}

#[async_trait]
impl<T: MetaHandler + ?Sized> MetaHandler for Arc<T> {
    async fn handle_get_file_info(&self, src: &str) -> DfsResult<Option<FileAttr>> {
        self.as_ref().handle_get_file_info(src).await
    }

    async fn handle_get_block_locations(
        &self,
        src: &str,
        offset: u64,
        length: u64,
    ) -> DfsResult<LocatedBlocks> {
        self.as_ref()
            .handle_get_block_locations(src, offset, length)
            .await
    }

    async fn handle_get_listing(
        &self,
        src: &str,
        start_after: &str,
        limit: u32,
    ) -> DfsResult<DirectoryListing> {
        self.as_ref()
            .handle_get_listing(src, start_after, limit)
            .await
    }
}

/// Request/response channel to a remote metadata service. Encoding on the
/// wire and connection handling belong to the implementor.
#[async_trait]
pub trait MetaTransport: Send + Sync {
    async fn execute(&self, method: &str, params: Value) -> DfsResult<Value>;
}

#[derive(Clone)]
pub enum MetaClient {
    InProcess(Arc<dyn MetaHandler>),
    Remote(Arc<dyn MetaTransport>),
}

impl MetaClient {
    pub fn new_in_process(handler: Arc<dyn MetaHandler>) -> Self {
        Self::InProcess(handler)
    }

    pub fn new_remote(transport: Arc<dyn MetaTransport>) -> Self {
        Self::Remote(transport)
    }

    /// Attributes of `src`. A missing path is `NotFound`.
    pub async fn get_file_info(&self, src: &str) -> DfsResult<FileAttr> {
        let info = match self {
            Self::InProcess(handler) => handler.handle_get_file_info(src).await?,
            Self::Remote(transport) => {
                let req = GetFileInfoReq::new(src);
                Self::call::<_, Option<FileAttr>>(
                    transport.as_ref(),
                    METHOD_GET_FILE_INFO,
                    &req,
                    "Option<FileAttr>",
                )
                .await?
            }
        };

        info.ok_or_else(|| DfsError::NotFound(src.to_string()))
    }

    pub async fn get_block_locations(
        &self,
        src: &str,
        offset: u64,
        length: u64,
    ) -> DfsResult<LocatedBlocks> {
        match self {
            Self::InProcess(handler) => {
                handler
                    .handle_get_block_locations(src, offset, length)
                    .await
            }
            Self::Remote(transport) => {
                let req = GetBlockLocationsReq::new(src, offset, length);
                Self::call(
                    transport.as_ref(),
                    METHOD_GET_BLOCK_LOCATIONS,
                    &req,
                    "LocatedBlocks",
                )
                .await
            }
        }
    }

    pub async fn get_listing(
        &self,
        src: &str,
        start_after: &str,
        limit: u32,
    ) -> DfsResult<DirectoryListing> {
        match self {
            Self::InProcess(handler) => handler.handle_get_listing(src, start_after, limit).await,
            Self::Remote(transport) => {
                let req = GetListingReq::new(src, start_after, limit);
                Self::call(transport.as_ref(), METHOD_GET_LISTING, &req, "DirectoryListing").await
            }
        }
    }

    async fn call<Req: Serialize, Resp: DeserializeOwned>(
        transport: &dyn MetaTransport,
        method: &str,
        req: &Req,
        expected: &str,
    ) -> DfsResult<Resp> {
        let req_json = serde_json::to_value(req).map_err(|e| {
            DfsError::Transport(format!("Failed to serialize {} request: {}", method, e))
        })?;

        let result = transport.execute(method, req_json).await?;
        serde_json::from_value(result).map_err(|e| {
            DfsError::Transport(format!("Expected {} result: {}", expected, e))
        })
    }
}

/// Serves a [`MetaHandler`] behind the [`MetaTransport`] interface.
pub struct MetaServerHandler<T: MetaHandler>(pub T);

impl<T: MetaHandler> MetaServerHandler<T> {
    pub fn new(handler: T) -> Self {
        Self(handler)
    }
}

#[async_trait]
impl<T: MetaHandler> MetaTransport for MetaServerHandler<T> {
    async fn execute(&self, method: &str, params: Value) -> DfsResult<Value> {
        let result = match method {
            METHOD_GET_FILE_INFO => {
                let req = GetFileInfoReq::from_json(params)?;
                let result = self.0.handle_get_file_info(&req.src).await?;
                serde_json::json!(result)
            }
            METHOD_GET_BLOCK_LOCATIONS => {
                let req = GetBlockLocationsReq::from_json(params)?;
                let result = self
                    .0
                    .handle_get_block_locations(&req.src, req.offset, req.length)
                    .await?;
                serde_json::json!(result)
            }
            METHOD_GET_LISTING => {
                let req = GetListingReq::from_json(params)?;
                let result = self
                    .0
                    .handle_get_listing(&req.src, &req.start_after, req.limit)
                    .await?;
                serde_json::json!(result)
            }
            _ => {
                return Err(DfsError::InvalidArgument(format!(
                    "unknown metadata method: {}",
                    method
                )))
            }
        };

        Ok(result)
    }
}
