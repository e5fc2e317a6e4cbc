//! Query side: context assembly, prompt templates, history, cost accounting
//! and the engine that ties them to a vector store and a generator.

pub mod budget;
pub mod context;
pub mod engine;
pub mod history;
pub mod prompt;

pub use budget::{estimate_tokens, BudgetTracker};
pub use context::build_context;
pub use engine::{Answer, QueryEngine, StreamingAnswer};
pub use history::{ConversationHistory, Turn};
pub use prompt::{Message, ModelFamily, PromptTemplate, Role};
