mod openai;
mod pollinations;

pub use openai::{OpenAiImagesProvider, DEFAULT_OPENAI_IMAGES_URL, DEFAULT_OPENAI_IMAGE_MODEL};
pub use pollinations::{PollinationsProvider, DEFAULT_POLLINATIONS_URL};

/// Upper bound on how much of an error body is kept for diagnostics.
const MAX_ERROR_BODY: usize = 512;
