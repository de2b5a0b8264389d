//! Data buffers bound to species and grid fields.
//!
//! A buffer starts out [`Unbound`](DataBuffer::Unbound) and is bound later,
//! either to an array owned by the runtime state or to an array shared with
//! the host model. Releasing a shared buffer only drops this side's reference;
//! the host keeps its data.

use ndarray::{Array, Dimension, Ix2, Ix3};
use std::sync::{Arc, RwLock};

pub type SharedArray<D> = Arc<RwLock<Array<f64, D>>>;

#[derive(Debug, Clone)]
pub enum DataBuffer<D: Dimension> {
    /// Not yet bound
    Unbound,
    /// Owned by the runtime state
    Owned(Array<f64, D>),
    /// Owned by the host and shared with the runtime state
    Shared(SharedArray<D>),
}

impl<D: Dimension> Default for DataBuffer<D> {
    fn default() -> Self {
        DataBuffer::Unbound
    }
}

pub type Buffer2D = DataBuffer<Ix2>;
pub type Buffer3D = DataBuffer<Ix3>;

impl<D: Dimension> DataBuffer<D> {
    pub fn is_bound(&self) -> bool {
        !matches!(self, DataBuffer::Unbound)
    }

    /// True if the runtime state owns the memory behind this buffer
    pub fn is_owned(&self) -> bool {
        matches!(self, DataBuffer::Owned(_))
    }

    /// Take ownership of `values`
    pub fn bind_owned(&mut self, values: Array<f64, D>) {
        *self = DataBuffer::Owned(values);
    }

    /// Point this buffer at a host-owned array
    pub fn bind_shared(&mut self, values: SharedArray<D>) {
        *self = DataBuffer::Shared(values);
    }

    /// Shape of the bound array, if any
    pub fn shape(&self) -> Option<Vec<usize>> {
        match self {
            DataBuffer::Unbound => None,
            DataBuffer::Owned(values) => Some(values.shape().to_vec()),
            DataBuffer::Shared(values) => values.read().ok().map(|v| v.shape().to_vec()),
        }
    }

    pub fn as_owned(&self) -> Option<&Array<f64, D>> {
        match self {
            DataBuffer::Owned(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_owned_mut(&mut self) -> Option<&mut Array<f64, D>> {
        match self {
            DataBuffer::Owned(values) => Some(values),
            _ => None,
        }
    }

    /// Release the buffer, returning to the unbound state.
    ///
    /// Safe to call on an unbound buffer.
    pub fn release(&mut self) {
        *self = DataBuffer::Unbound;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_starts_unbound() {
        let buffer = Buffer2D::default();
        assert!(!buffer.is_bound());
        assert_eq!(buffer.shape(), None);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut buffer = Buffer2D::default();
        buffer.bind_owned(Array2::zeros((2, 3)));
        assert!(buffer.is_owned());
        assert_eq!(buffer.shape(), Some(vec![2, 3]));

        buffer.release();
        buffer.release();
        assert!(!buffer.is_bound());
    }

    #[test]
    fn test_releasing_shared_keeps_host_data() {
        let host = Arc::new(RwLock::new(Array2::from_elem((2, 2), 1.5)));
        let mut buffer = Buffer2D::default();
        buffer.bind_shared(host.clone());
        assert!(buffer.is_bound());
        assert!(!buffer.is_owned());
        assert_eq!(Arc::strong_count(&host), 2);

        buffer.release();
        assert_eq!(Arc::strong_count(&host), 1);
        assert_eq!(host.read().unwrap()[[1, 1]], 1.5);
    }
}
