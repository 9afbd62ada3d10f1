pub mod format;
pub mod layout;
pub mod params;

pub use format::{CursorAlloc, ImageBuilder, MkfsError, MkfsReport};
pub use layout::FsLayout;
pub use params::MkfsParams;
