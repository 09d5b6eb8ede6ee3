//! Network bandwidth limiting.
//!
//! A token-bucket limiter shared by a folder tree: the root is wrapped once
//! and every sub-folder handle inherits the same bucket, so the limit applies
//! to the storage as a whole rather than per handle.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Instant, Sleep};

use walvault_common::Result;

use crate::folder::{Folder, Object, ObjectContent};

/// Token bucket over bytes.
pub struct RateLimiter {
    rate_per_sec: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    /// Limit to `rate_per_sec` bytes per second with a burst of one second's
    /// worth of traffic.
    pub fn new(rate_per_sec: u64) -> Arc<Self> {
        let rate = rate_per_sec as f64;
        Arc::new(Self {
            rate_per_sec: rate,
            burst: rate,
            state: Mutex::new(BucketState {
                tokens: rate,
                refilled_at: Instant::now(),
            }),
        })
    }

    /// Take `n` bytes out of the bucket. Returns how long the caller must
    /// wait before transferring more, if the bucket ran dry.
    pub fn debit(&self, n: usize) -> Option<Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.burst);
        state.refilled_at = now;

        state.tokens -= n as f64;
        if state.tokens >= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(-state.tokens / self.rate_per_sec))
        }
    }
}

/// Reader that pauses whenever its bucket runs dry.
struct RateLimitedReader {
    inner: ObjectContent,
    limiter: Arc<RateLimiter>,
    pending: Option<Pin<Box<Sleep>>>,
}

impl RateLimitedReader {
    fn new(inner: ObjectContent, limiter: Arc<RateLimiter>) -> ObjectContent {
        Box::new(Self {
            inner,
            limiter,
            pending: None,
        })
    }
}

impl AsyncRead for RateLimitedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(sleep) = this.pending.as_mut() {
            ready!(sleep.as_mut().poll(cx));
            this.pending = None;
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let n = buf.filled().len() - before;
        if n > 0 {
            if let Some(delay) = this.limiter.debit(n) {
                this.pending = Some(Box::pin(tokio::time::sleep(delay)));
            }
        }
        Poll::Ready(Ok(()))
    }
}

/// Folder whose transfers are throttled by a shared [`RateLimiter`].
pub struct LimitedFolder {
    inner: Arc<dyn Folder>,
    limiter: Arc<RateLimiter>,
}

impl LimitedFolder {
    pub fn new(inner: Arc<dyn Folder>, limiter: Arc<RateLimiter>) -> Arc<Self> {
        Arc::new(Self { inner, limiter })
    }
}

#[async_trait]
impl Folder for LimitedFolder {
    fn path(&self) -> &str {
        self.inner.path()
    }

    async fn list(&self) -> Result<(Vec<Object>, Vec<Arc<dyn Folder>>)> {
        let (objects, sub_folders) = self.inner.list().await?;
        let sub_folders = sub_folders
            .into_iter()
            .map(|f| LimitedFolder::new(f, Arc::clone(&self.limiter)) as Arc<dyn Folder>)
            .collect();
        Ok((objects, sub_folders))
    }

    fn sub_folder(&self, rel: &str) -> Arc<dyn Folder> {
        LimitedFolder::new(self.inner.sub_folder(rel), Arc::clone(&self.limiter))
    }

    async fn read(&self, rel: &str) -> Result<ObjectContent> {
        let reader = self.inner.read(rel).await?;
        Ok(RateLimitedReader::new(reader, Arc::clone(&self.limiter)))
    }

    async fn put(&self, rel: &str, content: ObjectContent) -> Result<()> {
        let content = RateLimitedReader::new(content, Arc::clone(&self.limiter));
        self.inner.put(rel, content).await
    }

    async fn put_with_deadline(
        &self,
        deadline: Instant,
        rel: &str,
        content: ObjectContent,
    ) -> Result<()> {
        let content = RateLimitedReader::new(content, Arc::clone(&self.limiter));
        self.inner.put_with_deadline(deadline, rel, content).await
    }

    async fn delete(&self, rel_paths: &[String]) -> Result<()> {
        self.inner.delete(rel_paths).await
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.inner.copy(src, dst).await
    }

    async fn exists(&self, rel: &str) -> Result<bool> {
        self.inner.exists(rel).await
    }
}
