//! 依鍵值序列化的鎖（同作業的提交、同報工的沖銷）

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// 鍵值鎖表
///
/// 鍵值只在有人持有或等待時存在，臨界區結束後即移除。
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在鍵值鎖內執行 `f`，中毒時照常取得
    pub fn run<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.handle(key);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(lock);
        self.prune(key);
        result
    }

    /// 目前存在的鍵值數
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }

    /// 表內為唯一引用時移除（複製只在表鎖內發生，無人持有或等待）
    fn prune(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_same_key_shares_lock() {
        let locks = KeyedLocks::new();
        let a = locks.handle("OP-1");
        let b = locks.handle("OP-1");
        let c = locks.handle("OP-2");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_entries_removed_after_run() {
        let locks = KeyedLocks::new();

        let value = locks.run("OP-1", || locks.run("OP-2", || locks.len()));
        assert_eq!(value, 2);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_entry_kept_while_handle_outstanding() {
        let locks = KeyedLocks::new();
        let outstanding = locks.handle("OP-1");

        locks.run("OP-1", || ());
        assert_eq!(locks.len(), 1);

        drop(outstanding);
        locks.run("OP-1", || ());
        assert!(locks.is_empty());
    }

    #[test]
    fn test_serializes_critical_section() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..100 {
                        locks.run("OP-1", || {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(locks.is_empty());
    }
}
