//! Store-specific app identifier extraction.
//!
//! - Google Play: the `id` query parameter, e.g.
//!   `https://play.google.com/store/apps/details?id=com.example.app`
//! - App Store: the digits after `id` in the path, e.g.
//!   `https://apps.apple.com/us/app/foo/id123456789`

use url::Url;

use crate::models::job::AppStore;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AppIdError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No {store} app id found in '{url}'")]
    NotFound { store: AppStore, url: String },
}

fn is_package_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Extract the app identifier for `store` from `raw_url`.
///
/// Never returns an empty identifier.
pub fn extract_app_id(raw_url: &str, store: AppStore) -> Result<String, AppIdError> {
    let url = Url::parse(raw_url).map_err(|e| AppIdError::InvalidUrl(e.to_string()))?;

    let found = match store {
        AppStore::Google => google_package_id(&url),
        AppStore::Apple => apple_numeric_id(url.path()),
    };

    found.ok_or_else(|| AppIdError::NotFound {
        store,
        url: raw_url.to_string(),
    })
}

fn google_package_id(url: &Url) -> Option<String> {
    url.query_pairs()
        .filter(|(key, _)| key == "id")
        .map(|(_, value)| value.chars().take_while(|c| is_package_char(*c)).collect::<String>())
        .find(|id| !id.is_empty())
}

fn apple_numeric_id(path: &str) -> Option<String> {
    path.match_indices("id")
        .map(|(idx, _)| {
            path[idx + 2..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
        })
        .find(|digits| !digits.is_empty())
}
