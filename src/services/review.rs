//! Store review prompt.

use super::RatingPrompt;

/// Opens the configured store review page in the default browser.
#[derive(Debug, Clone, Default)]
pub struct BrowserRatingPrompt {
    review_url: Option<String>,
}

impl BrowserRatingPrompt {
    #[must_use]
    pub fn new(review_url: Option<String>) -> Self {
        Self { review_url }
    }
}

impl RatingPrompt for BrowserRatingPrompt {
    fn request_review(&self) {
        let Some(url) = &self.review_url else {
            log::info!("[review] no review URL configured, skipping prompt");
            return;
        };
        if let Err(e) = open::that(url) {
            log::warn!("[review] failed to open {url}: {e}");
        }
    }
}
