pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod export;
pub mod notify;
pub mod session;
pub mod submission;
pub mod summary;
pub mod workflow;

pub use domain::booking::{BookingId, BookingStatus, ConferenceRoom, RoomBooking, RoomId};
pub use domain::claim::{Claim, ClaimId, ClaimStatus, ClaimType};
pub use domain::role::PortalRole;
pub use domain::user::User;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use summary::ClaimSummary;
pub use workflow::{
    BookingDecision, ClaimDecision, FinanceDecision, WorkflowEngine, WorkflowError, WorkflowTable,
};
