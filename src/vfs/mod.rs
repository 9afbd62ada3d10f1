pub mod file_table;
pub mod pipe;
pub mod types;
pub mod vnode;

pub use file_table::{FileTable, VnodeHandle};
pub use pipe::Pipe;
pub use types::{ContractViolation, OpenFlags, VfsError, VfsResult};
pub use vnode::{InodeBackend, SfsRootOps, VnodeKind, VnodeOps};
