pub mod convert;
pub mod extract;
pub mod naming;
pub mod orchestrator;
pub mod temp;
