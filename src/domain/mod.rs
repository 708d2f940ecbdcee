//! Marketplace data model shared by the backend and the client core
//!
//! Everything here is synchronous and free of I/O.

pub mod account;
pub mod actions;
pub mod contract;
pub mod listing;
pub mod message;
pub mod payment;
pub mod review;
pub mod schedule;
pub mod terms;

pub use account::{
    AuthResponse, ClientType, LoginRequest, RegisterRequest, Role, User, UserProfile,
    VerificationDecision, VerificationStatus, VerificationSubmission,
};
pub use actions::{available_actions, is_offered, status_style, ContractAction, StatusStyle};
pub use contract::{
    Contract, ContractDraft, ContractStatus, DraftError, InvariantViolation, NewContract, Signature,
    Transition, TransitionError,
};
pub use listing::{
    NewService, Service, ServiceFilters, ServiceRating, ServiceStatus, ServiceType, ServiceUpdate,
};
pub use message::{Conversation, Message, MessagePage, NewConversation, NewMessage, Participant};
pub use payment::{Payment, PaymentRequest, PaymentStatus, ProviderEarnings};
pub use review::{NewReview, Review, ReviewCategories};
pub use schedule::{PaymentScheduleItem, ScheduleStatus};
