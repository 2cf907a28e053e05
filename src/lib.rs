//! Facade over the workspace crates: tensors, layers and networks from
//! [`tensor`], the gradient-descent loop from [`training`].

pub use tensor;
pub use training;
