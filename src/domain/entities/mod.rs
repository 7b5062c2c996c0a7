pub mod contracts;
pub mod milestones;
pub mod payment_requests;
