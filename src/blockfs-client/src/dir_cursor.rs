use blockfs_lib::{DfsError, FileAttr, ListResult, MetaClient, PartialListing};
use log::debug;

/// Resumable walk over one remote directory.
///
/// The cursor remembers the name of the last entry it handed out and asks
/// the metadata service for entries after it. A single page may take several
/// listing calls when the service caps its batch size.
pub struct DirCursor {
    meta: MetaClient,
    path: String,
    last: String,
}

impl DirCursor {
    pub fn new(meta: MetaClient, path: &str) -> Self {
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };
        Self {
            meta,
            path: path.to_string(),
            last: String::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name of the last entry returned by a bounded page, empty before the
    /// first one.
    pub fn token(&self) -> &str {
        &self.last
    }

    fn entry_token<'a>(&self, name: &'a str) -> &'a str {
        let stripped = if self.path == "/" {
            name.strip_prefix('/')
        } else {
            name.strip_prefix(self.path.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
        };
        stripped.unwrap_or(name)
    }

    /// `n > 0`: up to `n` entries after the token, EOF when none are left.
    /// `n <= 0`: the whole directory from the start; the token is reset and
    /// not advanced.
    ///
    /// On failure the entries received before the error come back inside the
    /// [`PartialListing`].
    pub async fn get_page(&mut self, n: i32) -> ListResult<FileAttr> {
        if n <= 0 {
            self.last.clear();
        }
        let wanted = if n > 0 { Some(n as usize) } else { None };

        let mut entries: Vec<FileAttr> = Vec::new();
        let mut start_after = self.last.clone();
        let outcome = loop {
            let limit = match wanted {
                Some(wanted) => (wanted - entries.len()) as u32,
                None => 0,
            };

            let listing = match self.meta.get_listing(&self.path, &start_after, limit).await {
                Ok(listing) => listing,
                Err(err) => break Err(err),
            };
            let batch_len = listing.entries.len();
            if let Some(last) = listing.entries.last() {
                start_after = self.entry_token(&last.name).to_string();
            }
            entries.extend(listing.entries);

            let page_full = wanted.map_or(false, |wanted| entries.len() >= wanted);
            if listing.remaining == 0 || batch_len == 0 || page_full {
                break Ok(());
            }
            debug!(
                "listing {} continues after '{}', {} remaining",
                self.path, start_after, listing.remaining
            );
        };

        if let Some(wanted) = wanted {
            entries.truncate(wanted);
            if let Some(last) = entries.last() {
                self.last = self.entry_token(&last.name).to_string();
            }
        }

        match outcome {
            Err(err) => Err(PartialListing::new(entries, err)),
            Ok(()) if n > 0 && entries.is_empty() => Err(PartialListing::new(entries, DfsError::Eof)),
            Ok(()) => Ok(entries),
        }
    }
}
