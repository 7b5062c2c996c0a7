pub mod backend_api;
