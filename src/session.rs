use std::{collections::HashMap, sync::Arc};

use log::{info, warn};
use tokio::sync::Mutex;

use crate::{
    driver::{BrowserDriver, PageDriver},
    error::CourtError,
    site::{ACCEPT_LANGUAGE, USER_AGENT},
};

/// How far a page has been driven through the site. Ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NavigationStage {
    Start,
    LoggedIn,
    TermsAcknowledged,
    MenuOpen,
    SportSelected,
    RulesAccepted,
    BookingMenuOpen,
    WeekdaySelected,
    HourBlockSelected,
    AvailabilityVisible,
}

/// One browser page bound to one session tag.
pub struct Session {
    tag: String,
    page: Box<dyn PageDriver>,
    authenticated: bool,
    stage: NavigationStage,
}

impl Session {
    fn new(tag: String, page: Box<dyn PageDriver>) -> Self {
        Self {
            tag,
            page,
            authenticated: false,
            stage: NavigationStage::Start,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn stage(&self) -> NavigationStage {
        self.stage
    }

    pub(crate) fn set_stage(&mut self, stage: NavigationStage) {
        if stage >= NavigationStage::LoggedIn {
            self.authenticated = true;
        }
        self.stage = stage;
    }
}

/// Held for the whole of one engine call, so calls on a tag never interleave.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Maps session tags to live pages of the one shared browser.
///
/// Entries live until [`SessionRegistry::evict`] or
/// [`SessionRegistry::shutdown`]; nothing reaps idle tags.
pub struct SessionRegistry {
    browser: Arc<dyn BrowserDriver>,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(browser: Arc<dyn BrowserDriver>) -> Self {
        Self {
            browser,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the page for `tag`, opening one if the tag is unseen. The flag
    /// is true when the page is new and still needs logging in.
    pub async fn resolve(&self, tag: &str) -> Result<(SessionHandle, bool), CourtError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(tag) {
            return Ok((Arc::clone(existing), false));
        }

        let page = self
            .browser
            .new_page()
            .await
            .map_err(|err| CourtError::SessionUnavailable(err.to_string()))?;
        if let Err(err) = page.set_user_agent(USER_AGENT, ACCEPT_LANGUAGE).await {
            let _ = page.close().await;
            return Err(CourtError::SessionUnavailable(err.to_string()));
        }

        info!("opened page for session {tag}");
        let handle = Arc::new(Mutex::new(Session::new(tag.to_string(), page)));
        sessions.insert(tag.to_string(), Arc::clone(&handle));
        Ok((handle, true))
    }

    pub async fn get(&self, tag: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.get(tag).cloned()
    }

    /// Closes and forgets the page for `tag`. Waits for any in-flight call on it.
    pub async fn evict(&self, tag: &str) -> bool {
        let Some(handle) = self.sessions.lock().await.remove(tag) else {
            return false;
        };
        let session = handle.lock().await;
        if let Err(err) = session.page().close().await {
            warn!("closing page for session {tag} failed: {err}");
        }
        info!("evicted session {tag}");
        true
    }

    pub async fn shutdown(&self) {
        let drained: Vec<(String, SessionHandle)> =
            self.sessions.lock().await.drain().collect();
        for (tag, handle) in drained {
            let session = handle.lock().await;
            if let Err(err) = session.page().close().await {
                warn!("closing page for session {tag} failed: {err}");
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
