use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browser::{Browser, Element, Locator};
use crate::domain::CohortReference;
use crate::error::EtlError;

pub const COHORT_MARKER: &str = "TCGA";
pub const COHORT_NAME_TOKEN: &str = "TCGA.";
pub const PLATFORM_TEXT: &str = "IlluminaHiSeq";
pub const NORMALIZATION_TEXT: &str = "pancan normalized";
pub const DOWNLOAD_MARKER: &str = "download";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryTimings {
    pub catalog_settle: Duration,
    pub tab_settle: Duration,
    pub click_settle: Duration,
    pub element_wait: Duration,
}

impl Default for DiscoveryTimings {
    fn default() -> Self {
        Self {
            catalog_settle: Duration::from_secs(5),
            tab_settle: Duration::from_secs(3),
            click_settle: Duration::from_secs(2),
            element_wait: Duration::from_secs(10),
        }
    }
}

impl DiscoveryTimings {
    pub fn immediate() -> Self {
        Self {
            catalog_settle: Duration::ZERO,
            tab_settle: Duration::ZERO,
            click_settle: Duration::ZERO,
            element_wait: Duration::ZERO,
        }
    }
}

/// Progress of a single cohort page while its download link is being resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CohortState {
    Listed,
    TabOpened,
    DatasetLinkFound(Element),
    DatasetLinkClicked,
    DownloadLinkFound(Element),
    Resolved(String),
    NotFound(String),
}

pub struct CohortDiscoverer<B: Browser> {
    browser: B,
    timings: DiscoveryTimings,
}

impl<B: Browser> CohortDiscoverer<B> {
    pub fn new(browser: B, timings: DiscoveryTimings) -> Self {
        Self { browser, timings }
    }

    /// Walks the catalog and resolves one download URL per cohort.
    ///
    /// Never fails: driver errors end the walk early and whatever was resolved so far is
    /// returned. The browser session is shut down before returning.
    pub fn discover(mut self, catalog_url: &str) -> Vec<CohortReference> {
        let mut references = Vec::new();
        if let Err(err) = self.walk_catalog(catalog_url, &mut references) {
            warn!(error = %err, catalog_url, "error accessing cohort catalog");
        }
        if let Err(err) = self.browser.quit() {
            warn!(error = %err, "failed to shut down browser");
        }
        references
    }

    fn walk_catalog(
        &mut self,
        catalog_url: &str,
        references: &mut Vec<CohortReference>,
    ) -> Result<(), EtlError> {
        self.browser.render(catalog_url)?;
        thread::sleep(self.timings.catalog_settle);

        let entries = self
            .browser
            .find_all(&Locator::href_contains(COHORT_MARKER))?;
        info!(count = entries.len(), "catalog lists cohort links");

        for entry in entries {
            let Some(cohort_url) = entry.href.as_deref() else {
                continue;
            };
            let cohort_name = extract_cohort_name(cohort_url, &entry.text);
            info!(cohort = %cohort_name, "processing cohort");

            match self.resolve_download_url(cohort_url)? {
                Some(download_url) => references.push(CohortReference {
                    cohort_name,
                    download_url,
                }),
                None => warn!(cohort = %cohort_name, "no requested data found for cohort"),
            }
        }
        Ok(())
    }

    /// Only a failure to close the cohort tab escapes; everything else ends in `NotFound`.
    fn resolve_download_url(&mut self, cohort_url: &str) -> Result<Option<String>, EtlError> {
        let mut tab_open = false;
        let mut state = CohortState::Listed;

        let outcome = loop {
            state = match state {
                CohortState::Listed => match self.browser.open_context(cohort_url) {
                    Ok(()) => {
                        tab_open = true;
                        thread::sleep(self.timings.tab_settle);
                        CohortState::TabOpened
                    }
                    Err(err) => CohortState::NotFound(err.to_string()),
                },
                CohortState::TabOpened => {
                    let locator = Locator::text_contains_all([PLATFORM_TEXT, NORMALIZATION_TEXT]);
                    match self.browser.find(&locator, self.timings.element_wait) {
                        Ok(link) => CohortState::DatasetLinkFound(link),
                        Err(err) => CohortState::NotFound(err.to_string()),
                    }
                }
                CohortState::DatasetLinkFound(link) => match self.browser.click(&link) {
                    Ok(()) => {
                        thread::sleep(self.timings.click_settle);
                        CohortState::DatasetLinkClicked
                    }
                    Err(err) => CohortState::NotFound(err.to_string()),
                },
                CohortState::DatasetLinkClicked => {
                    let locator = Locator::href_contains(DOWNLOAD_MARKER);
                    match self.browser.find(&locator, self.timings.element_wait) {
                        Ok(link) => CohortState::DownloadLinkFound(link),
                        Err(err) => CohortState::NotFound(err.to_string()),
                    }
                }
                CohortState::DownloadLinkFound(link) => match link.href {
                    Some(href) => CohortState::Resolved(href),
                    None => CohortState::NotFound("download link has no href".to_string()),
                },
                CohortState::Resolved(url) => break Some(url),
                CohortState::NotFound(reason) => {
                    debug!(cohort_url, reason = %reason, "cohort link not resolved");
                    break None;
                }
            };
            debug!(cohort_url, state = ?state, "cohort state");
        };

        if tab_open {
            self.browser.close_context()?;
        }
        Ok(outcome)
    }
}

/// Takes the segment after `TCGA.` up to the next dot, else the link's visible text.
pub fn extract_cohort_name(cohort_url: &str, link_text: &str) -> String {
    match cohort_url.split_once(COHORT_NAME_TOKEN) {
        Some((_, rest)) => rest.split('.').next().unwrap_or(rest).to_string(),
        None => link_text.trim().to_string(),
    }
}
