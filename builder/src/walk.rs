use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use miku_sfs::fs::layout::{DIRSIZ, ROOTINO};
use miku_sfs::mkfs::{ImageBuilder, MkfsError, MkfsParams, MkfsReport};
use miku_sfs::BlockDevice;

use crate::image::ImageFile;

#[derive(Debug)]
pub enum BuildError {
    Io(PathBuf, io::Error),
    NotADirectory(PathBuf),
    Mkfs(MkfsError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "{}: {}", path.display(), e),
            Self::NotADirectory(path) => write!(f, "{}: not a directory", path.display()),
            Self::Mkfs(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<MkfsError> for BuildError {
    fn from(e: MkfsError) -> Self {
        Self::Mkfs(e)
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> BuildError + '_ {
    move |e| BuildError::Io(path.to_path_buf(), e)
}

/// Name an entry is stored under: leading '_'s dropped, cut to
/// `DIRSIZ` bytes. `None` for entries that are not copied.
pub fn image_name(host: &str) -> Option<String> {
    if host.starts_with('.') {
        return None;
    }
    let name = host.trim_start_matches('_');
    if name.is_empty() {
        return None;
    }
    if name.len() <= DIRSIZ {
        return Some(name.to_string());
    }
    let mut cut = DIRSIZ;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    log::warn!("[mkfs] name '{}' truncated to '{}'", name, &name[..cut]);
    Some(name[..cut].to_string())
}

/// Copies the children of host directory `src` into image directory
/// `dir`, in name order, recursing into subdirectories.
pub fn add_tree<D: BlockDevice>(b: &mut ImageBuilder<D>, dir: u32, src: &Path) -> Result<(), BuildError> {
    let mut entries = fs::read_dir(src)
        .map_err(io_err(src))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err(src))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let host = entry.file_name().to_string_lossy().into_owned();
        let Some(name) = image_name(&host) else {
            log::debug!("[mkfs] skip {}", path.display());
            continue;
        };

        let meta = fs::metadata(&path).map_err(io_err(&path))?;
        if meta.is_dir() {
            let child = b.mkdir(dir, &name)?;
            log::info!("[mkfs] {} -> dir ino {}", path.display(), child);
            add_tree(b, child, &path)?;
            b.finish_dir(child)?;
        } else if meta.is_file() {
            let data = fs::read(&path).map_err(io_err(&path))?;
            let inum = b.add_file(dir, &name, &data)?;
            log::info!("[mkfs] {} -> ino {} ({} bytes)", path.display(), inum, data.len());
        } else {
            log::warn!("[mkfs] skip {}: not a file or directory", path.display());
        }
    }
    Ok(())
}

/// Builds a complete volume at `image` from the tree under `source`.
pub fn build_image(image: &Path, source: &Path, params: &MkfsParams) -> Result<MkfsReport, BuildError> {
    if !source.is_dir() {
        return Err(BuildError::NotADirectory(source.to_path_buf()));
    }

    let mut file = ImageFile::create(image, params.size).map_err(io_err(image))?;
    let mut b = ImageBuilder::format(&mut file, params)?;
    add_tree(&mut b, ROOTINO, source)?;
    let report = b.finish()?;
    file.sync().map_err(io_err(image))?;
    Ok(report)
}
