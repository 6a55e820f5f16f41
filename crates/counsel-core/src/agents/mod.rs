//! The three first-pass agents and the follow-up responder.

pub mod analysis;
pub mod presentation;
pub mod research;
pub mod responder;

pub use analysis::{AnalysisAgent, AnalysisOutput, Feedback};
pub use presentation::{PRESENTATION_SECTIONS, Presentation, PresentationAgent};
pub use research::{ResearchAgent, ResearchOutcome, ResearchSettings};
pub use responder::{ConversationalResponder, FollowUpContext, InitialAnalysis, Reply};
