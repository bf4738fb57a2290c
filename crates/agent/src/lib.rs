//! Conversation engine for readmission-risk prediction.
//!
//! This crate drives the slot-filling dialogue that collects the model input
//! row one field per turn, then calls the prediction oracle and renders the
//! outcome as chat messages:
//! 1. **Transcript** (`transcript`) - Append-only message log seeded with the greeting
//! 2. **Prompting** (`prompts`) - The fixed message templates and risk formatting
//! 3. **Turn loop** (`engine`) - Record answer, prompt or predict, recover errors
//! 4. **Remote oracle** (`remote`) - HTTP client for an externally hosted model
//!
//! The engine never invents wording: every bot message comes from the
//! templates in `prompts`, so transcripts are replayable byte for byte.

pub mod engine;
pub mod prompts;
pub mod remote;
pub mod transcript;

pub use engine::{ConversationEngine, EngineError, EngineState, TurnOutcome};
pub use remote::HttpOracle;
pub use transcript::{Message, Role, Transcript};
