//! Recycling of request contexts.

use parking_lot::Mutex;

use crate::context::Context;

/// Idle contexts kept around; anything beyond is dropped on release.
const MAX_IDLE: usize = 1024;

/// A free list of boxed contexts.
///
/// Contexts are reset both when they leave and when they come back, so an
/// idle context never holds a request, a dispatcher handle or user data.
#[derive(Default)]
pub(crate) struct ContextPool {
    free: Mutex<Vec<Box<Context>>>,
}

impl ContextPool {
    pub(crate) fn acquire(&self) -> Box<Context> {
        match self.free.lock().pop() {
            Some(mut ctx) => {
                ctx.reset();
                ctx
            }
            None => Box::new(Context::new()),
        }
    }

    /// Returns `ctx` to the pool unless its reuse was disabled.
    pub(crate) fn release(&self, mut ctx: Box<Context>) {
        if !ctx.is_reusable() {
            return;
        }
        ctx.reset();
        let mut free = self.free.lock();
        if free.len() < MAX_IDLE {
            free.push(ctx);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.free.lock().len()
    }
}
