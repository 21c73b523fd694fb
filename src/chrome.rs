use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::config::BrowserOptions;
use crate::driver::{normalize_text, Driver, DriverError, Selector};

#[derive(Debug, Clone)]
pub struct ChromeElement(Arc<Element>);

/// A visible Chrome window driven over the DevTools protocol.
///
/// The CDP connection lives on a private tokio runtime; each trait call
/// blocks on it, so callers stay synchronous.
pub struct ChromeDriver {
    runtime: Runtime,
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

fn browser_config(options: &BrowserOptions) -> Result<BrowserConfig, DriverError> {
    let mut builder = BrowserConfig::builder()
        .with_head()
        .window_size(options.window_width, options.window_height)
        .launch_timeout(Duration::from_secs(options.launch_timeout_secs))
        .arg("--disable-gpu");
    if let Some(agent) = &options.user_agent {
        builder = builder.arg(format!("--user-agent={}", agent));
    }
    if let Some(exe) = &options.executable {
        builder = builder.chrome_executable(exe);
    }
    if let Some(dir) = &options.user_data_dir {
        builder = builder.user_data_dir(dir);
    }
    builder.build().map_err(DriverError::Launch)
}

/// Connection-level failures mean the window is gone.
fn command_error(e: CdpError) -> DriverError {
    match e {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            DriverError::Disconnected(e.to_string())
        }
        other => DriverError::Command(other.to_string()),
    }
}

async fn keep_matching(elements: Vec<Element>, contains: &str) -> Result<Vec<Element>, CdpError> {
    let mut kept = Vec::new();
    for element in elements {
        let text = element.inner_text().await?.unwrap_or_default();
        if normalize_text(&text).contains(contains) {
            kept.push(element);
        }
    }
    Ok(kept)
}

fn wrap(elements: Vec<Element>) -> Vec<ChromeElement> {
    elements.into_iter().map(|e| ChromeElement(Arc::new(e))).collect()
}

impl ChromeDriver {
    pub fn launch(options: &BrowserOptions) -> Result<Self, DriverError> {
        info!("Setting up Chrome session...");
        let config = browser_config(options)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let (browser, page, handler) = runtime
            .block_on(async {
                let (browser, mut events) = Browser::launch(config).await?;
                let handler = tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        if let Err(e) = event {
                            debug!("CDP handler: {}", e);
                        }
                    }
                });
                let page = browser.new_page("about:blank").await?;
                Ok::<_, CdpError>((browser, page, handler))
            })
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        info!("Chrome session ready.");
        Ok(ChromeDriver {
            runtime,
            browser,
            page,
            handler,
        })
    }
}

impl Driver for ChromeDriver {
    type Element = ChromeElement;

    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.runtime
            .block_on(self.page.goto(url))
            .map(|_| ())
            .map_err(|e| match command_error(e) {
                DriverError::Command(reason) => DriverError::Navigation {
                    url: url.to_string(),
                    reason,
                },
                fatal => fatal,
            })
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        let url = self.runtime.block_on(self.page.url()).map_err(command_error)?;
        Ok(url.unwrap_or_default())
    }

    fn page_source(&mut self) -> Result<String, DriverError> {
        self.runtime.block_on(self.page.content()).map_err(command_error)
    }

    fn find_all(&mut self, selector: &Selector) -> Result<Vec<ChromeElement>, DriverError> {
        let page = &self.page;
        let found = self
            .runtime
            .block_on(async move {
                match selector {
                    Selector::Css(css) => page.find_elements(css.as_str()).await,
                    Selector::XPath(xpath) => page.find_xpaths(xpath.as_str()).await,
                    Selector::CssText { css, contains } => {
                        keep_matching(page.find_elements(css.as_str()).await?, contains).await
                    }
                }
            })
            .map_err(command_error)?;
        Ok(wrap(found))
    }

    fn find_all_within(
        &mut self,
        parent: &ChromeElement,
        selector: &Selector,
    ) -> Result<Vec<ChromeElement>, DriverError> {
        let parent = &parent.0;
        let found = match selector {
            Selector::Css(css) => self.runtime.block_on(parent.find_elements(css.as_str())),
            Selector::CssText { css, contains } => self.runtime.block_on(async move {
                keep_matching(parent.find_elements(css.as_str()).await?, contains).await
            }),
            Selector::XPath(_) => return Err(DriverError::Unsupported("xpath inside an element")),
        }
        .map_err(command_error)?;
        Ok(wrap(found))
    }

    fn text(&mut self, element: &ChromeElement) -> Result<String, DriverError> {
        let text = self.runtime.block_on(element.0.inner_text()).map_err(command_error)?;
        Ok(normalize_text(&text.unwrap_or_default()))
    }

    fn attribute(&mut self, element: &ChromeElement, name: &str) -> Result<Option<String>, DriverError> {
        self.runtime.block_on(element.0.attribute(name)).map_err(command_error)
    }

    fn outer_html(&mut self, element: &ChromeElement) -> Result<String, DriverError> {
        let html = self.runtime.block_on(element.0.outer_html()).map_err(command_error)?;
        Ok(html.unwrap_or_default())
    }

    fn click(&mut self, element: &ChromeElement) -> Result<(), DriverError> {
        let page = &self.page;
        let element = &element.0;
        self.runtime
            .block_on(async move {
                element.click().await?;
                page.wait_for_navigation().await?;
                Ok::<_, CdpError>(())
            })
            .map_err(command_error)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let browser = &mut self.browser;
        let closed = self.runtime.block_on(async move {
            browser.close().await?;
            browser.wait().await?;
            Ok::<_, CdpError>(())
        });
        self.handler.abort();
        closed.map_err(command_error)
    }
}
