use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crate::cancel::Cancellable;
use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::fs::read::checksum_file;
use crate::types::ObjectType;

/// a checksum computed on a worker thread
#[derive(Debug)]
pub struct ChecksumTask {
    handle: JoinHandle<Result<Checksum>>,
    cancel: Cancellable,
}

impl ChecksumTask {
    /// request cancellation; the worker notices before its next io step
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// wait for the result
    pub fn join(self) -> Result<Checksum> {
        match self.handle.join() {
            Ok(res) => res,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// checksum `path` as `objtype` without blocking the caller
///
/// the returned task shares `cancel`, so cancelling either cancels both.
pub fn spawn_checksum(path: PathBuf, objtype: ObjectType, cancel: Option<Cancellable>) -> ChecksumTask {
    let cancel = cancel.unwrap_or_default();
    let token = cancel.clone();
    let handle = thread::spawn(move || {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        checksum_file(&path, objtype, Some(&token))
    });
    ChecksumTask { handle, cancel }
}
