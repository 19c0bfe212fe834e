use rayon::prelude::*;
use stemcell_common::BackendMode;

/// Execution strategy for the per-cell and per-edge kernels.
///
/// Every kernel is written once and driven through one of these arms; the
/// two arms must agree semantically, differing only in floating-point
/// reduction order and scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Data-parallel execution on the Rayon thread pool.
    Parallel,
    /// Single-threaded fallback.
    Sequential,
}

impl From<BackendMode> for Backend {
    fn from(mode: BackendMode) -> Self {
        match mode {
            BackendMode::Parallel => Backend::Parallel,
            BackendMode::Sequential => Backend::Sequential,
        }
    }
}

impl Backend {
    /// Runs `f(index) -> R` for each index in `0..len`, collecting results in
    /// index order.
    pub fn map_indexed<R, F>(self, len: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync + Send,
    {
        match self {
            Backend::Parallel => (0..len).into_par_iter().map(f).collect(),
            Backend::Sequential => (0..len).map(f).collect(),
        }
    }

    /// Runs `f(index, &mut item)` over every element of `items`. Each work
    /// item owns exactly its own slot; the closure must not touch any other
    /// mutable state.
    pub fn for_each_indexed<T, F>(self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        match self {
            Backend::Parallel => items.par_iter_mut().enumerate().for_each(|(i, item)| f(i, item)),
            Backend::Sequential => items.iter_mut().enumerate().for_each(|(i, item)| f(i, item)),
        }
    }

    /// Runs `f(index, &mut chunk, &mut count)` over per-agent slot ranges:
    /// chunk `i` is `slots[i * chunk_len .. (i + 1) * chunk_len]`. Used by the
    /// edge passes, where each focus cell writes only its own range.
    pub fn for_each_chunk<T, C, F>(self, slots: &mut [T], chunk_len: usize, counts: &mut [C], f: F)
    where
        T: Send,
        C: Send,
        F: Fn(usize, &mut [T], &mut C) + Sync + Send,
    {
        debug_assert_eq!(slots.len(), chunk_len * counts.len());
        match self {
            Backend::Parallel => slots
                .par_chunks_mut(chunk_len)
                .zip(counts.par_iter_mut())
                .enumerate()
                .for_each(|(i, (chunk, count))| f(i, chunk, count)),
            Backend::Sequential => slots
                .chunks_mut(chunk_len)
                .zip(counts.iter_mut())
                .enumerate()
                .for_each(|(i, (chunk, count))| f(i, chunk, count)),
        }
    }
}
