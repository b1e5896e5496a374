pub mod imaging;
pub mod llm;
pub mod media;
pub mod social;
pub mod video;
