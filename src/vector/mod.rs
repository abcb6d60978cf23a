// Article vectorization and similarity
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Character budget for a single embedding request.
pub const MAX_EMBED_CHARS: usize = 6000;

pub mod embedding;
pub mod similarity;
pub mod vectorizer;

// Re-export main components
pub use embedding::OpenAIEmbedder;
pub use similarity::{cosine_distance, cosine_similarity, distance_matrix};
pub use vectorizer::{embedding_text, Vectorizer};
