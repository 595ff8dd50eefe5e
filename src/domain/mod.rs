// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate family has its own subdirectory. `integration` joins their
// event enums into the single type the outbox relay decodes.
//
// ============================================================================

pub mod integration;
pub mod survey;

pub use integration::IntegrationEvent;
