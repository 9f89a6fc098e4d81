//! AI capability boundary for the studio: chat completion, media synthesis,
//! and the HTTP clients that speak to hosted or locally-deployed engines.

pub mod gemini;
pub mod http;
pub mod media;
pub mod provider;
