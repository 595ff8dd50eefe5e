// ============================================================================
// Survey Domain - Business Logic for Surveys and their Responses
// ============================================================================
//
// - Value objects (Question, QuestionAnswer, statuses)
// - Events for both aggregates, each with its own registry
// - Commands and the command handler
// - Errors (SurveyError enum)
//
// Nothing here knows about tables or brokers; persistence goes through the
// generic aggregate store.
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod events;
pub mod aggregate;
pub mod response;
pub mod commands;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use errors::*;
pub use events::*;
pub use aggregate::*;
pub use response::*;
pub use commands::*;
pub use command_handler::*;
