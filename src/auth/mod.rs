/// Runtime-swappable bearer credential
///
/// The executor reads the holder on every attempt, so a swap becomes
/// visible on the next attempt of any in-flight retry loop. Requests
/// already decorated keep the token they were built with.
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Atomically replaceable JWT holder; readers always see a whole value
#[derive(Debug, Default)]
pub struct JwtHolder {
    token: ArcSwapOption<String>,
}

impl JwtHolder {
    pub fn new() -> Self {
        Self {
            token: ArcSwapOption::empty(),
        }
    }

    /// Replace the current token; visible to all subsequent reads
    pub fn set_jwt(&self, token: impl Into<String>) {
        self.token.store(Some(Arc::new(token.into())));
    }

    /// Drop the current token; subsequent requests go unauthenticated
    pub fn clear_jwt(&self) {
        self.token.store(None);
    }

    pub fn jwt(&self) -> Option<Arc<String>> {
        self.token.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_holder_starts_empty() {
        let holder = JwtHolder::new();
        assert!(holder.jwt().is_none());
    }

    #[test]
    fn test_set_and_clear() {
        let holder = JwtHolder::new();
        holder.set_jwt("token-a");
        assert_eq!(holder.jwt().unwrap().as_str(), "token-a");

        holder.set_jwt("token-b");
        assert_eq!(holder.jwt().unwrap().as_str(), "token-b");

        holder.clear_jwt();
        assert!(holder.jwt().is_none());
    }

    #[test]
    fn test_swap_is_visible_to_concurrent_readers() {
        let holder = Arc::new(JwtHolder::new());
        holder.set_jwt("old");
        holder.set_jwt("new");

        // Once the swap returned, no reader may see the old value
        let mut readers = Vec::new();
        for _ in 0..50 {
            let holder = Arc::clone(&holder);
            readers.push(thread::spawn(move || {
                for _ in 0..100 {
                    assert_eq!(holder.jwt().unwrap().as_str(), "new");
                }
            }));
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
