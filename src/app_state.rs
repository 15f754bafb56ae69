use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::db::{JobStore, UserDirectory};
use crate::services::{
    delivery::ArtifactDelivery, queue::JobDispatcher, storage::ArtifactStore,
    submission::SubmissionService,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub users: Arc<dyn UserDirectory>,
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub tokens: Arc<TokenVerifier>,
    pub submissions: Arc<SubmissionService>,
    pub delivery: Arc<ArtifactDelivery>,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        users: Arc<dyn UserDirectory>,
        artifacts: Arc<dyn ArtifactStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        tokens: TokenVerifier,
    ) -> Self {
        let submissions = SubmissionService::new(jobs.clone(), users.clone(), dispatcher.clone());
        let delivery = ArtifactDelivery::new(jobs.clone(), artifacts);
        Self {
            jobs,
            users,
            dispatcher,
            tokens: Arc::new(tokens),
            submissions: Arc::new(submissions),
            delivery: Arc::new(delivery),
        }
    }
}
