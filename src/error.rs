use thirtyfour::error::WebDriverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("WebDriver session could not be started: {0}")]
    Session(#[source] WebDriverError),

    #[error("element '{element}' not found: {source}")]
    ElementNotFound {
        element: String,
        #[source]
        source: WebDriverError,
    },

    #[error("navigation failed while {step}: {reason}")]
    Navigation { step: String, reason: String },

    #[error("no markets available for {commodity} in {state}")]
    NoMarketsAvailable { state: String, commodity: String },

    #[error("row {row}: {reason}")]
    Parse { row: usize, reason: String },

    #[error("scrape failed: {0}")]
    Failure(String),
}

impl ScrapeError {
    pub fn navigation(step: impl Into<String>, reason: impl ToString) -> Self {
        Self::Navigation {
            step: step.into(),
            reason: reason.to_string(),
        }
    }

    pub fn element(element: impl Into<String>) -> impl FnOnce(WebDriverError) -> Self {
        let element = element.into();
        move |source| Self::ElementNotFound { element, source }
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
