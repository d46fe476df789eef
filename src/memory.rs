use ndarray::Array2;

/// Reusable image buffer, avoids reallocating per-frame scratch maps.
#[derive(Clone, Debug)]
pub enum Array2Recycle<T> {
    Empty,
    Recycle(Array2<T>),
}

impl<T> Array2Recycle<T>
where
    T: num::Zero + Clone,
{
    pub fn get(self, required_dim: (usize, usize)) -> Array2<T> {
        match self {
            Self::Empty => Array2::<T>::zeros(required_dim),
            Self::Recycle(current) => {
                if current.dim() != required_dim {
                    Array2::<T>::zeros(required_dim)
                } else {
                    current
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
