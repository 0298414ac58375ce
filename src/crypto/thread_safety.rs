//! Thread safety implementations for cryptographic types.
//!
//! This module provides the `unsafe impl Send` and `unsafe impl Sync` for
//! [`MasterKeys`]. These implementations are sound because:
//!
//! 1. **RwLock protection**: all access to the underlying `MemSafe` data goes through
//!    `RwLock`, which provides proper synchronization.
//!
//! 2. **No concurrent raw pointer access**: the raw pointer in `MemSafe` is only used
//!    for memory protection operations (mlock, mprotect), which are thread-safe at the OS level.
//!    The actual data access goes through the `MemSafe::read()` method which the RwLock protects.
//!
//! 3. **No data races**: the RwLock ensures that multiple readers can access
//!    concurrently and writers get exclusive access; the raw pointer is never
//!    dereferenced without holding the lock.
//!
//! This matters because the worker executor shares one `Arc<MasterKeys>` across
//! every worker thread in the pool for the duration of an `encryptFile`/`decryptFile` call.

use super::keys::MasterKeys;

// SAFETY: MasterKeys can be sent between threads because all fields are
// wrapped in RwLock, which synchronizes access, and the underlying MemSafe's
// raw pointer points to memory valid regardless of which thread accesses it.
unsafe impl Send for MasterKeys {}

// SAFETY: MasterKeys can be shared between threads because all access to the
// key material goes through RwLock::read()/write(); the raw pointer in
// MemSafe is never accessed without holding the lock.
unsafe impl Sync for MasterKeys {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn master_keys_is_send() {
        assert_send::<MasterKeys>();
    }

    #[test]
    fn master_keys_is_sync() {
        assert_sync::<MasterKeys>();
    }

    #[test]
    fn arc_master_keys_is_send() {
        assert_send::<Arc<MasterKeys>>();
    }

    #[test]
    fn can_share_across_threads() {
        let keys = Arc::new(MasterKeys::random().expect("generate keys"));

        let keys1 = Arc::clone(&keys);
        let keys2 = Arc::clone(&keys);

        let handle1 = thread::spawn(move || keys1.with_aes_key(|k| k[0]).expect("access key"));
        let handle2 = thread::spawn(move || keys2.with_mac_key(|k| k[0]).expect("access key"));

        handle1.join().expect("thread 1");
        handle2.join().expect("thread 2");
    }

    #[test]
    fn concurrent_reads() {
        let keys = Arc::new(MasterKeys::random().expect("generate keys"));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let keys = Arc::clone(&keys);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    keys.with_aes_key(|k| k[0]).expect("access key");
                }
            }));
        }

        for handle in handles {
            handle.join().expect("thread completed");
        }
    }
}
