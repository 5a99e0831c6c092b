use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Dedicated Rayon pool for hit testing off the input path.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(name: &str, size: usize) -> Result<Self> {
        let threads = size.max(1);
        let prefix = name.to_string();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |index| format!("{prefix}-{index}"))
            .build()
            .with_context(|| format!("build {name} thread pool with {threads} threads"))?;
        Ok(Self { pool, threads })
    }

    pub fn size(&self) -> usize {
        self.threads
    }

    /// Splits `items` into one chunk per thread, runs `f` on each chunk inside
    /// the pool and returns the concatenated results in chunk order.
    pub fn scatter<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&[T]) -> Vec<R> + Send + Sync,
    {
        if items.is_empty() {
            return Vec::new();
        }
        let chunk = items.len().div_ceil(self.threads);
        self.pool.install(|| {
            items
                .par_chunks(chunk)
                .map(|part| f(part))
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect()
        })
    }
}
