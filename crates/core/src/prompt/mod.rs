pub mod assembler;
pub mod personas;

pub use assembler::{PromptAssembler, PromptPayload};
