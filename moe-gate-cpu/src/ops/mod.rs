//! CPU implementations of the backend op traits.

pub mod topk_softmax;
