#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

#[cfg(not(target_arch = "wasm32"))]
pub const PARALLEL_THRESHOLD: usize = 1024;

pub fn for_each_indexed_mut<T, F>(slice: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    #[cfg(not(target_arch = "wasm32"))]
    {
        if slice.len() >= PARALLEL_THRESHOLD {
            slice
                .par_iter_mut()
                .enumerate()
                .for_each(|(idx, value)| f(idx, value));
            return;
        }
    }

    for (idx, value) in slice.iter_mut().enumerate() {
        f(idx, value);
    }
}

/// Like `for_each_indexed_mut`, with a scratch value created once per worker.
pub fn for_each_indexed_mut_with_scratch<T, S, I, F>(slice: &mut [T], init: I, f: F)
where
    T: Send,
    I: Fn() -> S + Sync + Send,
    F: Fn(&mut S, usize, &mut T) + Sync + Send,
{
    #[cfg(not(target_arch = "wasm32"))]
    {
        if slice.len() >= PARALLEL_THRESHOLD {
            slice
                .par_iter_mut()
                .enumerate()
                .for_each_init(&init, |scratch, (idx, value)| f(scratch, idx, value));
            return;
        }
    }

    let mut scratch = init();
    for (idx, value) in slice.iter_mut().enumerate() {
        f(&mut scratch, idx, value);
    }
}
