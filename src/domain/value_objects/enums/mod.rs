pub mod contract_statuses;
pub mod error_categories;
pub mod milestone_statuses;
pub mod payment_request_statuses;
