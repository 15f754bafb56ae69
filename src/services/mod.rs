pub mod app_id;
pub mod delivery;
pub mod encryption;
pub mod packager;
pub mod processor;
pub mod queue;
pub mod quota;
pub mod source;
pub mod storage;
pub mod submission;
pub mod worker_pool;
