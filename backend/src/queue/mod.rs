pub mod review_queue;

pub use review_queue::{QueueFilter, ReviewQueue, priority, sort_by_priority};
