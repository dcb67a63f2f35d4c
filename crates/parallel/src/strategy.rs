//! Parallel processing strategies

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use sei_core::{Error, Result};

/// Processing mode for tiles and scenario members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing on the global rayon pool
    #[default]
    Parallel,
    /// Parallel on a dedicated pool with the given number of threads
    ParallelWith(usize),
}

/// Strategy for running independent units of work
pub trait ParallelStrategy {
    /// Map a fallible function over items, keeping input order
    fn try_map<I, T, F>(&self, items: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Result<T> + Sync + Send;

    /// Map a function over items and keep every result, successful or not
    fn map_all<I, T, F>(&self, items: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> T + Sync + Send;
}

impl ParallelStrategy for ProcessingMode {
    fn try_map<I, T, F>(&self, items: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Result<T> + Sync + Send,
    {
        self.map_all(items, f)?.into_iter().collect()
    }

    fn map_all<I, T, F>(&self, items: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => Ok(items.into_iter().map(f).collect()),
            #[cfg(feature = "parallel")]
            ProcessingMode::Parallel => Ok(items.into_par_iter().map(f).collect()),
            #[cfg(feature = "parallel")]
            ProcessingMode::ParallelWith(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(*threads)
                    .build()
                    .map_err(|e| Error::Other(format!("Failed to build thread pool: {}", e)))?;
                Ok(pool.install(|| items.into_par_iter().map(f).collect()))
            }
            #[cfg(not(feature = "parallel"))]
            ProcessingMode::Parallel | ProcessingMode::ParallelWith(_) => {
                Ok(items.into_iter().map(f).collect())
            }
        }
    }
}

/// Number of worker threads available to the global pool
pub fn num_threads() -> usize {
    #[cfg(feature = "parallel")]
    {
        rayon::current_num_threads()
    }
    #[cfg(not(feature = "parallel"))]
    {
        1
    }
}
