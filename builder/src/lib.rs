//! Host side of the sfs image builder: a file-backed block device and
//! the directory walk that fills a fresh volume.

pub mod image;
pub mod walk;

pub use image::ImageFile;
pub use walk::{build_image, BuildError};
