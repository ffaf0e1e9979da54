use crate::config::BrowserConfig;
use crate::error::{ScrapeError, ScrapeResult};
use thirtyfour::{ChromeCapabilities, ChromiumLikeCapabilities};
use thirtyfour::prelude::*;
use tracing::{debug, warn};

/// One private WebDriver session. Whoever starts it must `close()` it;
/// nothing else holds the driver.
pub struct BrowserSession {
    driver: WebDriver,
}

impl BrowserSession {
    pub async fn start(config: &BrowserConfig) -> ScrapeResult<Self> {
        let caps = chrome_capabilities(config).map_err(ScrapeError::Session)?;

        debug!("Opening WebDriver session at {}", config.webdriver_url);
        let driver = WebDriver::new(config.webdriver_url.as_str(), caps)
            .await
            .map_err(ScrapeError::Session)?;

        if let Err(e) = apply_timeouts(&driver, config).await {
            if let Err(quit_err) = driver.quit().await {
                warn!("Failed to quit half-configured session: {}", quit_err);
            }
            return Err(ScrapeError::Session(e));
        }

        Ok(Self { driver })
    }

    pub fn driver(&self) -> &WebDriver {
        &self.driver
    }

    pub async fn close(self) {
        match self.driver.quit().await {
            Ok(()) => debug!("WebDriver session closed"),
            Err(e) => warn!("Failed to close WebDriver session: {}", e),
        }
    }
}

fn chrome_capabilities(config: &BrowserConfig) -> WebDriverResult<ChromeCapabilities> {
    let mut caps = DesiredCapabilities::chrome();

    if config.headless {
        caps.set_headless()?;
    }
    caps.set_no_sandbox()?;
    caps.set_disable_dev_shm_usage()?;
    caps.set_disable_gpu()?;

    let (width, height) = config.window_size;
    caps.add_arg(&format!("--window-size={width},{height}"))?;
    caps.add_arg(&format!("--user-agent={}", config.user_agent))?;
    for arg in &config.extra_args {
        caps.add_arg(arg)?;
    }

    Ok(caps)
}

async fn apply_timeouts(driver: &WebDriver, config: &BrowserConfig) -> WebDriverResult<()> {
    driver
        .set_page_load_timeout(config.page_load_timeout())
        .await?;
    driver.set_implicit_wait_timeout(config.implicit_wait()).await?;
    Ok(())
}
