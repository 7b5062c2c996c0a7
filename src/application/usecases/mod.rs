pub mod contract_workflow;
