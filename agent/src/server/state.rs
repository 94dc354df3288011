//! Server state

use crate::filesys::dir::Dir;
use crate::storage::layout::StorageLayout;

/// Server state shared across handlers
pub struct ServerState {
    pub pending: Dir,
    pub processed: Dir,
}

impl ServerState {
    pub fn new(layout: &StorageLayout) -> Self {
        Self {
            pending: layout.pending_dir(),
            processed: layout.processed_dir(),
        }
    }
}
