//! Conversational engine for Solace.
//!
//! Classifies each message, keeps a short per-user memory, composes an
//! empathetic reply and recommends support resources for the detected
//! emotion.

pub mod classifier;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod resources;
pub mod response;

pub use classifier::{ClassificationGateway, EmotionClassifier, HttpClassifier, Prediction};
pub use context::{Session, SessionStore};
pub use error::{ChatError, ErrorKind};
pub use orchestrator::{ConversationOrchestrator, TurnOutcome, TurnReply};
pub use resources::{ResourceCatalog, ResourceEntry};
pub use response::{FixedRandom, IntentTable, RandomSource, ResponseGenerator, ThreadRandom};
