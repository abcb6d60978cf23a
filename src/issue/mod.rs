pub mod bias;
pub mod prompts;
pub mod synthesizer;

pub use bias::BiasComposition;
pub use synthesizer::{cluster_ids, representative_image, IssueSynthesizer};
