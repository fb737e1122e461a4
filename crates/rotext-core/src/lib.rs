pub mod config;
pub mod error;
pub mod stage;
pub mod state;
pub mod text;
pub mod types;

pub use config::{CompressorConfig, ProbabilitySource};
pub use error::{CompressError, Result};
pub use stage::Stage;
pub use state::{MetadataRecord, ProcessingState};
pub use types::{join_tokens, Token, TokenKind};
