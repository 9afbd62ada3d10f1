use spin::Mutex;

use super::types::{VfsError, VfsResult, PIPESIZE};

struct PipeState {
    data:      [u8; PIPESIZE],
    nread:     usize,
    nwrite:    usize,
    readopen:  bool,
    writeopen: bool,
}

/// Bounded byte ring shared by one read end and one write end. Nothing
/// here sleeps: an empty or full pipe reports `WouldBlock`.
pub struct Pipe {
    state: Mutex<PipeState>,
}

impl Pipe {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PipeState {
                data: [0; PIPESIZE],
                nread: 0,
                nwrite: 0,
                readopen: true,
                writeopen: true,
            }),
        }
    }

    pub fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        let mut p = self.state.lock();
        if p.nread == p.nwrite {
            return if p.writeopen { Err(VfsError::WouldBlock) } else { Ok(0) };
        }
        let n = buf.len().min(p.nwrite - p.nread);
        for b in buf.iter_mut().take(n) {
            *b = p.data[p.nread % PIPESIZE];
            p.nread += 1;
        }
        Ok(n)
    }

    pub fn write(&self, data: &[u8]) -> VfsResult<usize> {
        let mut p = self.state.lock();
        if !p.readopen {
            return Err(VfsError::BrokenPipe);
        }
        let room = PIPESIZE - (p.nwrite - p.nread);
        let n = data.len().min(room);
        if n == 0 && !data.is_empty() {
            return Err(VfsError::WouldBlock);
        }
        for &b in &data[..n] {
            let at = p.nwrite % PIPESIZE;
            p.data[at] = b;
            p.nwrite += 1;
        }
        Ok(n)
    }

    /// Closes one end.
    pub fn close(&self, writable: bool) {
        let mut p = self.state.lock();
        if writable {
            p.writeopen = false;
        } else {
            p.readopen = false;
        }
        log::debug!("[pipe] {} end closed", if writable { "write" } else { "read" });
    }

    pub fn is_closed(&self) -> bool {
        let p = self.state.lock();
        !p.readopen && !p.writeopen
    }

    pub fn len(&self) -> usize {
        let p = self.state.lock();
        p.nwrite - p.nread
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}
