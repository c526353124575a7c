//! Buffer pool
//!
//! A pool of equally-sized packet buffers. `acquire` hands out a writable
//! view over a free buffer; when the last view referencing that buffer is
//! dropped, the storage goes back on the free list. The pool never blocks
//! and is not thread-safe (one pool per processing thread).

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::{BufferWritableView, PacketBuffer};
use crate::error::{BufferError, BufferResult};

struct Shared {
    free: RefCell<Vec<Vec<u8>>>,
}

/// Handle kept inside a pool-owned buffer so its storage can find the way
/// back on the last drop.
#[derive(Clone)]
pub(crate) struct PoolHandle(Rc<Shared>);

impl PoolHandle {
    pub(crate) fn release(&self, mut data: Vec<u8>) {
        data.fill(0);
        self.0.free.borrow_mut().push(data);
    }
}

/// Fixed-size pool of reusable packet buffers.
pub struct BufferPool {
    shared: Rc<Shared>,
    buffer_size: usize,
    capacity: usize,
}

impl BufferPool {
    /// Create a pool of `count` buffers of `buffer_size` bytes each.
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let free = (0..count).map(|_| vec![0u8; buffer_size]).collect();
        BufferPool {
            shared: Rc::new(Shared {
                free: RefCell::new(free),
            }),
            buffer_size,
            capacity: count,
        }
    }

    /// Take a buffer off the free list and return a writable view over it.
    pub fn acquire(&self) -> BufferResult<BufferWritableView> {
        let data = self
            .shared
            .free
            .borrow_mut()
            .pop()
            .ok_or(BufferError::Exhausted)?;
        let buf = PacketBuffer::new(data, Some(PoolHandle(self.shared.clone())));
        Ok(BufferWritableView::whole(buf))
    }

    /// Number of buffers currently on the free list.
    pub fn free_count(&self) -> usize {
        self.shared.free.borrow().len()
    }

    /// Total number of buffers managed by the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size in bytes of each buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}
