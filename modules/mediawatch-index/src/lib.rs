pub mod embedder;
pub mod error;
pub mod index;

pub use embedder::{FakeEmbedder, FastembedEmbedder, TextEmbedder};
pub use error::IndexError;
pub use index::{SharedIndex, SimilarityIndex};
