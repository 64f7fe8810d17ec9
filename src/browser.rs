use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::EtlError;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const DEFAULT_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Anchors whose `href` contains the given substring.
    HrefContains(String),
    /// Anchors whose visible text contains every given substring.
    TextContainsAll(Vec<String>),
}

impl Locator {
    pub fn href_contains(fragment: impl Into<String>) -> Self {
        Locator::HrefContains(fragment.into())
    }

    pub fn text_contains_all<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Locator::TextContainsAll(parts.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, element: &Element) -> bool {
        match self {
            Locator::HrefContains(fragment) => element
                .href
                .as_deref()
                .map(|href| href.contains(fragment.as_str()))
                .unwrap_or(false),
            Locator::TextContainsAll(parts) => parts
                .iter()
                .all(|part| element.text.contains(part.as_str())),
        }
    }

    fn webdriver_query(&self) -> (&'static str, String) {
        match self {
            Locator::HrefContains(fragment) => ("css selector", format!("a[href*='{fragment}']")),
            Locator::TextContainsAll(parts) => {
                let predicates = parts
                    .iter()
                    .map(|part| format!("contains(text(), '{part}')"))
                    .collect::<Vec<_>>()
                    .join(" and ");
                ("xpath", format!("//a[{predicates}]"))
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::HrefContains(fragment) => write!(f, "link with href containing '{fragment}'"),
            Locator::TextContainsAll(parts) => {
                write!(f, "link with text containing '{}'", parts.join("' and '"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub id: String,
    pub href: Option<String>,
    pub text: String,
}

/// Minimal page-automation surface needed to walk the cohort catalog.
pub trait Browser {
    fn render(&mut self, url: &str) -> Result<(), EtlError>;
    fn find_all(&mut self, locator: &Locator) -> Result<Vec<Element>, EtlError>;
    fn click(&mut self, element: &Element) -> Result<(), EtlError>;
    /// Opens `url` in a new tab and makes it the active context.
    fn open_context(&mut self, url: &str) -> Result<(), EtlError>;
    /// Closes the active tab and returns to the catalog tab.
    fn close_context(&mut self) -> Result<(), EtlError>;
    fn quit(&mut self) -> Result<(), EtlError>;

    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL
    }

    /// Polls until an element matches or `timeout` elapses.
    fn find(&mut self, locator: &Locator, timeout: Duration) -> Result<Element, EtlError> {
        let start = Instant::now();
        loop {
            if let Some(element) = self.find_all(locator)?.into_iter().next() {
                return Ok(element);
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(EtlError::ElementTimeout {
                    locator: locator.to_string(),
                    waited_ms: waited.as_millis(),
                });
            }
            thread::sleep(self.poll_interval().min(timeout - waited));
        }
    }
}

/// W3C WebDriver client (chromedriver, geckodriver) driving a single session.
pub struct WebDriverBrowser {
    client: Client,
    base_url: String,
    session_id: Option<String>,
    main_handle: Option<String>,
}

impl WebDriverBrowser {
    pub fn connect(base_url: &str, headless: bool) -> Result<Self, EtlError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("tcga-etl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EtlError::BrowserProtocol(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| EtlError::BrowserHttp(err.to_string()))?;

        let mut browser = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: None,
            main_handle: None,
        };
        let args = if headless {
            vec!["--headless", "--disable-gpu"]
        } else {
            Vec::new()
        };
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });
        let url = format!("{}/session", browser.base_url);
        let value = browser.send(Method::POST, &url, Some(capabilities))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| EtlError::BrowserProtocol("new session without sessionId".to_string()))?;
        debug!(session_id, "webdriver session created");
        browser.session_id = Some(session_id.to_string());
        Ok(browser)
    }

    fn session_url(&self, path: &str) -> Result<String, EtlError> {
        let session_id = self
            .session_id
            .as_deref()
            .ok_or_else(|| EtlError::BrowserProtocol("webdriver session is closed".to_string()))?;
        Ok(format!("{}/session/{session_id}{path}", self.base_url))
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, EtlError> {
        let url = self.session_url(path)?;
        self.send(method, &url, body)
    }

    fn send(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value, EtlError> {
        let mut request = self.client.request(method.clone(), url);
        if method == Method::POST {
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }
        let response = request
            .send()
            .map_err(|err| EtlError::BrowserHttp(err.to_string()))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .map_err(|err| EtlError::BrowserProtocol(err.to_string()))?;
        if !status.is_success() {
            let message = payload
                .pointer("/value/message")
                .and_then(Value::as_str)
                .unwrap_or("webdriver command failed")
                .to_string();
            return Err(EtlError::BrowserStatus {
                status: status.as_u16(),
                message,
            });
        }
        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    }

    fn string_property(&self, element_id: &str, path: &str) -> Result<Option<String>, EtlError> {
        let value = self.command(Method::GET, &format!("/element/{element_id}{path}"), None)?;
        Ok(value.as_str().map(str::to_string))
    }

    fn switch_to(&self, handle: &str) -> Result<(), EtlError> {
        self.command(Method::POST, "/window", Some(json!({ "handle": handle })))?;
        Ok(())
    }
}

impl Browser for WebDriverBrowser {
    fn render(&mut self, url: &str) -> Result<(), EtlError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))?;
        let handle = self.command(Method::GET, "/window", None)?;
        self.main_handle = handle.as_str().map(str::to_string);
        Ok(())
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<Element>, EtlError> {
        let (using, value) = locator.webdriver_query();
        let found = self.command(
            Method::POST,
            "/elements",
            Some(json!({ "using": using, "value": value })),
        )?;
        let references = found
            .as_array()
            .ok_or_else(|| EtlError::BrowserProtocol("elements response is not a list".to_string()))?;

        let mut elements = Vec::with_capacity(references.len());
        for reference in references {
            let Some(id) = reference.get(ELEMENT_KEY).and_then(Value::as_str) else {
                continue;
            };
            let href = self.string_property(id, "/attribute/href")?;
            let text = self.string_property(id, "/text")?.unwrap_or_default();
            elements.push(Element {
                id: id.to_string(),
                href,
                text,
            });
        }
        Ok(elements)
    }

    fn click(&mut self, element: &Element) -> Result<(), EtlError> {
        self.command(Method::POST, &format!("/element/{}/click", element.id), None)?;
        Ok(())
    }

    fn open_context(&mut self, url: &str) -> Result<(), EtlError> {
        let created = self.command(Method::POST, "/window/new", Some(json!({ "type": "tab" })))?;
        let handle = created
            .get("handle")
            .and_then(Value::as_str)
            .ok_or_else(|| EtlError::BrowserProtocol("new window without handle".to_string()))?
            .to_string();
        self.switch_to(&handle)?;
        self.command(Method::POST, "/url", Some(json!({ "url": url })))?;
        Ok(())
    }

    fn close_context(&mut self) -> Result<(), EtlError> {
        self.command(Method::DELETE, "/window", None)?;
        if let Some(main) = self.main_handle.clone() {
            self.switch_to(&main)?;
        }
        Ok(())
    }

    fn quit(&mut self) -> Result<(), EtlError> {
        if self.session_id.is_none() {
            return Ok(());
        }
        let result = self.command(Method::DELETE, "", None);
        self.session_id = None;
        self.main_handle = None;
        result.map(|_| ())
    }
}

impl Drop for WebDriverBrowser {
    fn drop(&mut self) {
        if let Err(err) = self.quit() {
            warn!(error = %err, "failed to end webdriver session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(href: Option<&str>, text: &str) -> Element {
        Element {
            id: "e1".to_string(),
            href: href.map(str::to_string),
            text: text.to_string(),
        }
    }

    #[test]
    fn href_locator_matches_substring() {
        let locator = Locator::href_contains("download");
        assert!(locator.matches(&anchor(Some("https://x/download/a.gz"), "")));
        assert!(!locator.matches(&anchor(Some("https://x/a.gz"), "download")));
        assert!(!locator.matches(&anchor(None, "")));
    }

    #[test]
    fn text_locator_requires_every_part() {
        let locator = Locator::text_contains_all(["IlluminaHiSeq", "pancan normalized"]);
        assert!(locator.matches(&anchor(
            None,
            "gene expression RNAseq (IlluminaHiSeq pancan normalized)"
        )));
        assert!(!locator.matches(&anchor(None, "IlluminaHiSeq percentile")));
    }

    #[test]
    fn webdriver_queries() {
        let (using, value) = Locator::href_contains("TCGA").webdriver_query();
        assert_eq!(using, "css selector");
        assert_eq!(value, "a[href*='TCGA']");

        let (using, value) = Locator::text_contains_all(["A", "B"]).webdriver_query();
        assert_eq!(using, "xpath");
        assert_eq!(value, "//a[contains(text(), 'A') and contains(text(), 'B')]");
    }
}
