//! Claim and room booking approval workflows.
//!
//! Every function here is pure: callers load the record, ask for a transition,
//! and persist it atomically together with its log entry and notifications.

pub mod booking;
pub mod engine;
pub mod finance;
pub mod registry;
pub mod resolver;

pub use booking::{
    approval_queue, decide_booking, decide_booking_with_audit, elapsed_bookings, ensure_slot_free,
    find_conflicts, overlaps, BookingDecision, BookingSlot, BookingTransition,
};
pub use engine::{ClaimDecision, ClaimTransition, PaymentStamp, WorkflowEngine, WorkflowError};
pub use finance::{
    decide_finance, decide_finance_with_audit, payment_queue, FinanceDecision, PAYMENT_STAGE,
};
pub use resolver::{ResolvedAction, TransitionRule, WorkflowConfigError, WorkflowTable};
