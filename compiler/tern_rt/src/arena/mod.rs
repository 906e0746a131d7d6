//! Per-invocation allocation arena.
//!
//! Everything allocated while an [`InvocationScope`] is live (marshaled
//! arguments, records built by compiled code) is freed when the scope ends.
//! Results must be decoded into host values before that.

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::BridgeError;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

#[derive(Default)]
struct Arena {
    blocks: Vec<(NonNull<u8>, Layout)>,
}

impl Arena {
    fn alloc(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if !align.is_power_of_two() {
            return None;
        }
        let layout = Layout::from_size_align(size.max(1), align.max(8)).ok()?;
        // SAFETY: layout has a non-zero size and a power-of-two alignment.
        let ptr = NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })?;
        self.blocks.push((ptr, layout));
        Some(ptr)
    }

    fn release_from(&mut self, mark: usize) {
        for (ptr, layout) in self.blocks.drain(mark..) {
            // SAFETY: every block was allocated above with this layout and
            // is released exactly once.
            unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.release_from(0);
    }
}

thread_local! {
    static ARENA: RefCell<Arena> = RefCell::new(Arena::default());
    static NUM_CORES: Cell<i64> = const { Cell::new(1) };
}

/// Zeroed arena memory for `size` bytes.
pub fn alloc(size: usize, align: usize) -> Result<NonNull<u8>, BridgeError> {
    ARENA
        .with(|arena| arena.borrow_mut().alloc(size, align))
        .ok_or(BridgeError::OutOfMemory { size })
}

/// Number of live arena blocks on this thread.
pub fn live_blocks() -> usize {
    ARENA.with(|arena| arena.borrow().blocks.len())
}

/// Bounds the lifetime of one native invocation's allocations and fixes
/// the degree of parallelism compiled code observes.
///
/// Scopes nest; dropping one frees only what was allocated inside it.
pub struct InvocationScope {
    mark: usize,
    previous_cores: i64,
    _not_send: PhantomData<*const ()>,
}

impl InvocationScope {
    pub fn enter(num_cores: usize) -> Self {
        let cores = i64::try_from(num_cores.max(1)).unwrap_or(i64::MAX);
        InvocationScope {
            mark: live_blocks(),
            previous_cores: NUM_CORES.with(|n| n.replace(cores)),
            _not_send: PhantomData,
        }
    }
}

impl Drop for InvocationScope {
    fn drop(&mut self) {
        let mark = self.mark;
        let released = live_blocks().saturating_sub(mark);
        ARENA.with(|arena| arena.borrow_mut().release_from(mark));
        tracing::trace!(released, "invocation arena released");
        NUM_CORES.with(|n| n.set(self.previous_cores));
    }
}

/// Arena allocation for compiled code. Returns null on failure.
#[no_mangle]
pub extern "C" fn tern_rt_alloc(size: i64, align: i64) -> *mut u8 {
    let (Ok(size), Ok(align)) = (usize::try_from(size), usize::try_from(align)) else {
        return std::ptr::null_mut();
    };
    alloc(size, align).map_or(std::ptr::null_mut(), NonNull::as_ptr)
}

/// Degree of parallelism fixed for the current invocation.
#[no_mangle]
pub extern "C" fn tern_rt_num_cores() -> i64 {
    NUM_CORES.with(Cell::get)
}
