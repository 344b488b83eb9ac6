//! # nerfeed Vectors
//!
//! Readers for pretrained word-vector dumps. [`VectorDirectory`] plugs them
//! into [`nerfeed_core::Pipeline`] as a [`nerfeed_core::VectorProvider`].
pub mod error;
pub mod keyed;
pub mod provider;

pub use error::{Result, VectorError};
pub use keyed::KeyedVectors;
pub use provider::VectorDirectory;
