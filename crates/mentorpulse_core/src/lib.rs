pub mod chat;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod ports;
pub mod presence;
pub mod sessions;
pub mod skills;

#[cfg(test)]
mod testing;

pub use chat::{ChatEngine, SeenSelection};
pub use domain::{
    AuthSession, BookingRequest, Chat, ChatEvent, ChatSummary, ChatView, Message, MessagePage,
    MessageType, Progress, Role, Session, SessionType, Skill, SkillClaim, User, UserCredentials,
    UserSummary,
};
pub use error::{EngineError, EngineResult};
pub use lifecycle::{Party, SessionStatus, VerificationStatus};
pub use memory::InMemoryStore;
pub use ports::{
    Audience, ConnectionId, EventPublisher, MeetingRoomProvider, PortError, PortResult,
    PresenceRegistry,
};
pub use presence::InMemoryPresence;
pub use sessions::{ApprovalInput, ApprovalOutcome, CompletionReport, CreditPolicy, SessionEngine};
pub use skills::SkillCreditor;
