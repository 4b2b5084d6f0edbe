mod block_locator;
mod block_mux;
mod client;
mod dir_cursor;
mod file;

#[cfg(test)]
mod test_fixture;

pub use block_locator::{BlockLayout, BlockLocator};
pub use block_mux::{BlockStreamMux, MuxPhase};
pub use client::BlockFsClient;
pub use dir_cursor::DirCursor;
pub use file::{BlockFile, SEEK_CUR, SEEK_END, SEEK_SET};
