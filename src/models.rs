//! The objects passed between the agent, providers, and tools.
//!
//! Several wire formats overlap here: openai messages/tools sent to the LLM,
//! anthropic messages/tools sent to the LLM, and the tool invocations sent to
//! locally registered tools. Providers convert those formats to and from the
//! internal structs immediately at the boundary, so nothing outside of
//! `providers` ever sees a vendor shape.
pub mod message;
