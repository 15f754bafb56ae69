use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::ScreenshotJob;

/// Largest number of URLs accepted by one batch request.
pub const MAX_BATCH_SIZE: usize = 25;

/// Request to fetch screenshots for a single app.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    #[garde(url, length(max = 2048))]
    pub url: String,

    #[garde(length(min = 1, max = 16))]
    pub store: String,
}

/// Request to fetch screenshots for several apps of the same store.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchSubmitRequest {
    #[garde(length(min = 1, max = 25), inner(url, length(max = 2048)))]
    pub urls: Vec<String>,

    #[garde(length(min = 1, max = 16))]
    pub store: String,
}

/// Response for a batch submission.
#[derive(Debug, Serialize)]
pub struct BatchSubmitResponse {
    pub jobs: Vec<ScreenshotJob>,
}
