use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::error::EngineError;

/// The process current directory is the one shared mutable resource the engine touches outside
/// of a task's own working directory. Changing it is therefore serialized process-wide, so that
/// two tasks running on different threads (e.g. two `#[test]` functions in the same binary)
/// cannot interleave their `chdir` calls. The lock is reentrant per-thread, since a task's `run`
/// recursing into a not-yet-ready dependency's `run` (`TaskNode::ready_inputs`) enters a nested
/// `DirGuard` on the very same thread, which must not block on a lock that thread already holds.
struct LockState {
  holder: Option<ThreadId>,
  depth: u32,
}

static LOCK: Mutex<LockState> = Mutex::new(LockState { holder: None, depth: 0 });
static RELEASED: Condvar = Condvar::new();

fn lock_current_dir() {
  let this_thread = thread::current().id();
  let mut state = LOCK.lock().unwrap_or_else(|e| e.into_inner());
  while let Some(holder) = state.holder {
    if holder == this_thread {
      break;
    }
    state = RELEASED.wait(state).unwrap_or_else(|e| e.into_inner());
  }
  state.holder = Some(this_thread);
  state.depth += 1;
}

fn unlock_current_dir() {
  let mut state = LOCK.lock().unwrap_or_else(|e| e.into_inner());
  state.depth -= 1;
  if state.depth == 0 {
    state.holder = None;
    RELEASED.notify_all();
  }
}

/// RAII guard that changes the process current directory to `path` for its lifetime, restoring
/// the previous directory when dropped — including when dropped during unwinding from a `?`
/// propagated through the guard's scope.
pub struct DirGuard {
  previous: PathBuf,
}

impl DirGuard {
  pub fn enter(path: &Path) -> Result<Self, EngineError> {
    lock_current_dir();
    let previous = match std::env::current_dir() {
      Ok(previous) => previous,
      Err(e) => {
        unlock_current_dir();
        return Err(EngineError::io(path, e));
      }
    };
    if let Err(e) = std::env::set_current_dir(path) {
      unlock_current_dir();
      return Err(EngineError::io(path, e));
    }
    Ok(Self { previous })
  }
}

impl Drop for DirGuard {
  fn drop(&mut self) {
    // Best-effort: there is nowhere to report a failure to restore the directory from a `Drop`.
    let _ = std::env::set_current_dir(&self.previous);
    unlock_current_dir();
  }
}
