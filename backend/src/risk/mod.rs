pub mod catalog;
pub mod engine;
pub mod policy;

pub use catalog::{LabelCatalog, LabelEntry, Severity};
pub use engine::{AssessmentError, RiskEngine};
pub use policy::{PolicyConfig, PolicyError, TriagePolicy, normalize_region};
