//! Rayon when the `parallel` feature is on, plain iterators otherwise.
//!
//! Kernels in this crate iterate rows with `into_par_iter()`; without the
//! feature the sequential shim below resolves that call to `into_iter()`
//! and the rest of the chain to `std::iter::Iterator`.
#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;
