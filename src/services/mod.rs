pub mod checkout;
pub mod extractor;
pub mod generator;
pub mod llm;
pub mod payments;
pub mod pipeline;
pub mod step_parser;
pub mod store;
