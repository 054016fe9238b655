//! Bounded, lazily allocated buffer pools for the unpacker.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// Pool of fixed-size byte buffers.
///
/// Buffers are allocated on demand up to the pool's cap; once the cap is
/// reached, `acquire` blocks until another buffer is returned. Dropping a
/// [`PooledBuffer`] returns it.
pub(crate) struct BufferPool {
    size: usize,
    cap: usize,
    allocated: AtomicUsize,
    sender: mpsc::Sender<Box<[u8]>>,
    receiver: Mutex<mpsc::Receiver<Box<[u8]>>>,
}

impl BufferPool {
    pub fn new(size: usize, cap: usize) -> Arc<BufferPool> {
        let (sender, receiver) = mpsc::channel(cap);
        Arc::new(BufferPool {
            size,
            cap,
            allocated: AtomicUsize::new(0),
            sender,
            receiver: Mutex::new(receiver),
        })
    }

    /// Size of each buffer in the pool.
    pub fn buffer_size(&self) -> usize {
        self.size
    }

    pub async fn acquire(&self) -> PooledBuffer {
        let mut receiver = self.receiver.lock().await;
        if let Ok(returned) = receiver.try_recv() {
            return PooledBuffer { buf: Some(returned), home: self.sender.clone() };
        }
        let below_cap = self
            .allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < self.cap).then_some(count + 1)
            })
            .is_ok();
        if below_cap {
            let fresh = vec![0u8; self.size].into_boxed_slice();
            return PooledBuffer { buf: Some(fresh), home: self.sender.clone() };
        }
        let returned = receiver.recv().await.expect("pool sender is owned by the pool");
        PooledBuffer { buf: Some(returned), home: self.sender.clone() }
    }
}

/// A buffer checked out of a [`BufferPool`]; returns itself on drop.
pub(crate) struct PooledBuffer {
    buf: Option<Box<[u8]>>,
    home: mpsc::Sender<Box<[u8]>>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            // Channel capacity equals the pool cap, so the return cannot
            // be rejected for lack of space.
            let _ = self.home.try_send(buf);
        }
    }
}
