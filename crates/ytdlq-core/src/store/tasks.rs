//! Active task operations. Reads and writes are split by file.

mod read;
mod write;

pub(super) use write::{delete_marker, insert_active, insert_failed};
