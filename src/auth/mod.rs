//! Explicit auth context handed to the transport adapter at startup

mod context;
mod storage;

pub use context::AuthContext;
pub use storage::{FileTokenStorage, MemoryTokenStorage, StoredToken, TokenStorage};
