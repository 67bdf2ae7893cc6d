//! The agent runner. Invokes an external LLM agent with a prompt,
//! enforces a timeout, and extracts the first well-formed JSON object
//! from its free-form reply.

pub mod executor;
pub mod json_extract;

pub use executor::{AgentExecutor, FixedReplyExecutor, ProcessAgentExecutor};
pub use json_extract::{extract_fields_manual, extract_json_object};
