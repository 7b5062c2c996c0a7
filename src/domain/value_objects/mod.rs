pub mod enums;
pub mod gateway_errors;
pub mod money;
pub mod validation;
