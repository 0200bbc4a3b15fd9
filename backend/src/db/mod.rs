pub mod case_store;
pub mod dynamodb_repository;
pub mod memory_store;

pub use case_store::{CaseStore, StoreError};
pub use dynamodb_repository::DynamoDbCaseRepository;
pub use memory_store::InMemoryCaseStore;
