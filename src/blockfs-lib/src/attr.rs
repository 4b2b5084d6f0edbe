use serde::{Deserialize, Serialize};

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Attributes of a file or directory, as reported by the metadata service.
///
/// `name` is the path the service reported for the entry. For listings this
/// is usually the full path of the child, use [`FileAttr::file_name`] for the
/// last component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttr {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,

    #[serde(default)]
    pub mode: u32,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub group: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub mtime: u64, //ms since epoch
    #[serde(default, skip_serializing_if = "is_zero")]
    pub atime: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub block_size: u64,
    #[serde(default)]
    pub replication: u32,
}

impl FileAttr {
    pub fn new_file(name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            size,
            is_dir: false,
            mode: 0o644,
            owner: String::new(),
            group: String::new(),
            mtime: 0,
            atime: 0,
            block_size: 0,
            replication: 0,
        }
    }

    pub fn new_dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: 0,
            is_dir: true,
            mode: 0o755,
            owner: String::new(),
            group: String::new(),
            mtime: 0,
            atime: 0,
            block_size: 0,
            replication: 0,
        }
    }

    /// Last path component of `name`. The root keeps its full name.
    pub fn file_name(&self) -> &str {
        let trimmed = self.name.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((_, last)) if !last.is_empty() => last,
            _ if trimmed.is_empty() => self.name.as_str(),
            _ => trimmed,
        }
    }
}
