pub mod contract_gateway;
pub mod session;
