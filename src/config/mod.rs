use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// The portal keeps roughly a decade of daily reports.
const MAX_DATE_OFFSET_DAYS: i64 = 3650;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub portal: PortalConfig,
    pub scraper: ScraperConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

/// WebDriver session configuration, handed to every session constructor
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agent: String,
    pub window_size: (u32, u32),
    pub page_load_timeout_secs: u64,
    pub implicit_wait_secs: u64,
    pub extra_args: Vec<String>,
}

/// The remote form and the element ids it is driven through
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    pub commodity_select: String,
    pub state_select: String,
    pub date_input: String,
    pub go_button: String,
    pub market_select: String,
    pub results_table: String,
    pub popup_class: String,
    pub popup_close_class: String,
    pub popup_wait_secs: u64,
    pub postback_wait_secs: u64,
    pub table_wait_secs: u64,
    pub step_wait_secs: u64,
    pub date_offset_days: i64,
}

/// Scraper / batch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub request_delay_ms: u64,
    pub columns: ColumnMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnMode {
    /// Derive positions from the header row, fall back to the fixed layout
    #[default]
    Auto,
    /// Always use the fixed legacy layout
    Fixed,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            environment: "development".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            window_size: (1920, 1080),
            page_load_timeout_secs: 30,
            implicit_wait_secs: 10,
            extra_args: vec![
                "--disable-extensions".to_string(),
                "--disable-software-rasterizer".to_string(),
                "--disable-features=TranslateUI".to_string(),
            ],
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://agmarknet.gov.in/SearchCmmMkt.aspx".to_string(),
            commodity_select: "ddlCommodity".to_string(),
            state_select: "ddlState".to_string(),
            date_input: "txtDate".to_string(),
            go_button: "btnGo".to_string(),
            market_select: "ddlMarket".to_string(),
            results_table: "cphBody_GridPriceData".to_string(),
            popup_class: "popup-onload".to_string(),
            popup_close_class: "close".to_string(),
            popup_wait_secs: 5,
            postback_wait_secs: 3,
            table_wait_secs: 15,
            step_wait_secs: 10,
            date_offset_days: 7,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 3000,
            columns: ColumnMode::Auto,
        }
    }
}

// ── Accessors ────────────────────────────────────────────────────────────────

impl ServerConfig {
    pub fn is_debug(&self) -> bool {
        !self.environment.eq_ignore_ascii_case("production")
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

impl BrowserConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn implicit_wait(&self) -> Duration {
        Duration::from_secs(self.implicit_wait_secs)
    }
}

impl PortalConfig {
    pub fn popup_wait(&self) -> Duration {
        Duration::from_secs(self.popup_wait_secs)
    }

    pub fn postback_wait(&self) -> Duration {
        Duration::from_secs(self.postback_wait_secs)
    }

    pub fn table_wait(&self) -> Duration {
        Duration::from_secs(self.table_wait_secs)
    }

    pub fn step_wait(&self) -> Duration {
        Duration::from_secs(self.step_wait_secs)
    }
}

impl ScraperConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("AGMARKNET").separator("__"))
            .build()?;

        let mut app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Plain PORT / APP_ENV win, as on most PaaS hosts
        if let Ok(port) = std::env::var("PORT") {
            app_cfg.server.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port: {port}"))?;
        }
        if let Ok(env) = std::env::var("APP_ENV") {
            app_cfg.server.environment = env;
        }

        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.browser.webdriver_url)
            .with_context(|| format!("Invalid webdriver_url {}", self.browser.webdriver_url))?;
        url::Url::parse(&self.portal.base_url)
            .with_context(|| format!("Invalid portal base_url {}", self.portal.base_url))?;

        if self.browser.page_load_timeout_secs == 0 || self.portal.table_wait_secs == 0 {
            bail!("Timeouts must be greater than zero");
        }
        if !(0..=MAX_DATE_OFFSET_DAYS).contains(&self.portal.date_offset_days) {
            bail!(
                "date_offset_days must be between 0 and {}, got {}",
                MAX_DATE_OFFSET_DAYS,
                self.portal.date_offset_days
            );
        }
        Ok(())
    }
}
