//! Production environment backed by the OS clock and entropy pool.

use std::time::{Duration, Instant};

use skein_core::Environment;

/// Production environment.
///
/// - `Instant::now()` for time
/// - `tokio::time::sleep()` for the sync loop's retry delay
/// - `getrandom` for local echo ids
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Local echo ids only need uniqueness within a session. Falling
            // back to the clock keeps them distinct without panicking.
            tracing::error!(error = %e, "getrandom failed, falling back to clock bytes");
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.as_nanos());
            for (byte, source) in buffer.iter_mut().zip(nanos.to_le_bytes().iter().cycle()) {
                *byte = *source;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = env.now();

        assert!(t2 > t1);
    }

    #[test]
    fn random_bytes_differ() {
        let env = SystemEnv::new();

        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        env.random_bytes(&mut a);
        env.random_bytes(&mut b);

        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn sleep_waits() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(20)).await;

        assert!(env.now() - start >= Duration::from_millis(20));
    }
}
