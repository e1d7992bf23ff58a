//! Splitting an input sequence into per-worker chunks.

/// The outcome of [`chunk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunks<T> {
    /// No work: the size was not positive or the input was empty.
    Empty,
    /// A size of one hands the input back untouched rather than wrapping
    /// every element in its own chunk.
    Unchanged(Vec<T>),
    /// Contiguous, non-empty chunks in input order.
    Parts(Vec<Vec<T>>),
}

impl<T> Chunks<T> {
    /// Number of workers this split would occupy.
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Unchanged(items) => items.len(),
            Self::Parts(parts) => parts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens the split into one chunk per worker.
    ///
    /// [`Chunks::Unchanged`] yields a one-element chunk per item.
    pub fn into_parts(self) -> Vec<Vec<T>> {
        match self {
            Self::Empty => Vec::new(),
            Self::Unchanged(items) => items.into_iter().map(|item| vec![item]).collect(),
            Self::Parts(parts) => parts,
        }
    }
}

/// Slices `items` into chunks of `size` elements.
///
/// When the next slice would leave exactly one element behind, the size grows
/// by one before slicing so the tail is absorbed instead of forming a
/// single-element chunk. The grown size is kept for any later slices.
///
/// # Examples
///
/// ```
/// use hardworker::chunk::{chunk, Chunks};
///
/// let parts = chunk(&[1, 2, 3, 4, 5, 6, 7], 3);
/// assert_eq!(parts, Chunks::Parts(vec![vec![1, 2, 3], vec![4, 5, 6, 7]]));
///
/// assert_eq!(chunk(&[1, 2, 3], 1), Chunks::Unchanged(vec![1, 2, 3]));
/// assert_eq!(chunk(&[1, 2, 3], 0), Chunks::Empty);
/// ```
pub fn chunk<T: Clone>(items: &[T], size: isize) -> Chunks<T> {
    if size <= 0 {
        return Chunks::Empty;
    }

    if size == 1 {
        return Chunks::Unchanged(items.to_vec());
    }

    if items.is_empty() {
        return Chunks::Empty;
    }

    let total = items.len();
    let mut size = size as usize;
    let mut index = 0;
    let mut parts = Vec::with_capacity(total.div_ceil(size));

    while index < total {
        if index + size + 1 == total {
            size += 1;
        }
        let end = (index + size).min(total);
        parts.push(items[index..end].to_vec());
        index = end;
    }

    Chunks::Parts(parts)
}
