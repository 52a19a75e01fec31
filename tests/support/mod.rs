#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use courtwatch::{
    BrowserDriver, CONFIRMATION_FLAG, CleanSlot, DriverError, ElementTarget, PageDriver,
    RawSlotEntry,
};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    NewPage,
    SetUserAgent,
    Navigate(String),
    WaitFor(String),
    Fill(String, String),
    Click(ElementTarget),
    Eval(String),
    WaitStable,
    Url,
    Content,
    Close,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    html: String,
    url: String,
    confirming: Vec<String>,
    failing_scripts: Vec<String>,
    missing_elements: Vec<String>,
    fail_new_page: bool,
    crashed: bool,
}

/// A scripted browser: every page serves the same HTML and records every
/// primitive it is asked to perform.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn new(html: &str) -> Self {
        let browser = Self::default();
        browser.set_html(html);
        browser
    }

    pub fn set_html(&self, html: &str) {
        self.state.lock().unwrap().html = html.to_string();
    }

    /// Evaluating a script containing `token` moves the page to the
    /// confirmation step.
    pub fn confirm_token(&self, token: &str) {
        self.state.lock().unwrap().confirming.push(token.to_string());
    }

    /// Scripts containing `fragment` evaluate to `false`.
    pub fn fail_script(&self, fragment: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_scripts
            .push(fragment.to_string());
    }

    pub fn hide_element(&self, selector: &str) {
        self.state
            .lock()
            .unwrap()
            .missing_elements
            .push(selector.to_string());
    }

    /// While set, every open page behaves like a tab whose renderer died.
    pub fn set_crashed(&self, crashed: bool) {
        self.state.lock().unwrap().crashed = crashed;
    }

    pub fn fail_new_page(&self) {
        self.state.lock().unwrap().fail_new_page = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Records `call`, then fails it if the tab has crashed.
    fn drive(&self, call: Call) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.crashed {
            return Err(DriverError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        self.record(Call::NewPage);
        if self.state.lock().unwrap().fail_new_page {
            return Err(DriverError::Closed);
        }
        Ok(Box::new(FakePage {
            browser: self.clone(),
        }))
    }
}

pub struct FakePage {
    browser: FakeBrowser,
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.browser.drive(Call::Navigate(url.to_string()))?;
        self.browser.state.lock().unwrap().url = url.to_string();
        Ok(())
    }

    async fn set_user_agent(&self, _: &str, _: &str) -> Result<(), DriverError> {
        self.browser.drive(Call::SetUserAgent)?;
        Ok(())
    }

    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        self.browser.drive(Call::WaitFor(selector.to_string()))?;
        let state = self.browser.state.lock().unwrap();
        if state.missing_elements.iter().any(|missing| missing == selector) {
            return Err(DriverError::Timeout {
                what: selector.to_string(),
                secs: timeout.as_secs(),
            });
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.browser
            .drive(Call::Fill(selector.to_string(), text.to_string()))?;
        Ok(())
    }

    async fn click(&self, target: &ElementTarget) -> Result<(), DriverError> {
        self.browser.drive(Call::Click(target.clone()))?;
        if let ElementTarget::First(selector) = target {
            let state = self.browser.state.lock().unwrap();
            if state.missing_elements.iter().any(|missing| missing == selector) {
                return Err(DriverError::NotFound(selector.clone()));
            }
        }
        Ok(())
    }

    async fn eval(&self, script: &str) -> Result<Value, DriverError> {
        self.browser.drive(Call::Eval(script.to_string()))?;
        let mut state = self.browser.state.lock().unwrap();
        if state
            .failing_scripts
            .iter()
            .any(|fragment| script.contains(fragment.as_str()))
        {
            return Ok(Value::Bool(false));
        }
        if state
            .confirming
            .iter()
            .any(|token| script.contains(token.as_str()))
        {
            state.url = format!("https://nd01.xuanen.com.tw/BPMemberOrder/BPMemberOrder?{CONFIRMATION_FLAG}");
        } else if script.contains("window.location") {
            state.url = "https://nd01.xuanen.com.tw/BPHome/BPHome".to_string();
        }
        Ok(Value::Bool(true))
    }

    async fn wait_stable(&self, _: Duration) -> Result<(), DriverError> {
        self.browser.drive(Call::WaitStable)?;
        // A real page settles asynchronously; let other tasks run meanwhile.
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn url(&self) -> Result<String, DriverError> {
        self.browser.drive(Call::Url)?;
        Ok(self.browser.state.lock().unwrap().url.clone())
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.browser.drive(Call::Content)?;
        Ok(self.browser.state.lock().unwrap().html.clone())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.browser.record(Call::Close);
        Ok(())
    }
}

pub const WEEKDAY_LABELS: [&str; 7] = ["日", "一", "二", "三", "四", "五", "六"];

pub struct Listing<'a> {
    pub court: &'a str,
    pub time: &'a str,
    pub action: Option<&'a str>,
}

/// A booking page with the weekday row, the date row and `listings`.
pub fn booking_page(labels: &[&str], listings: &[Listing]) -> String {
    let label_row: String = labels.iter().map(|l| format!("<div>{l}</div>")).collect();
    let date_row: String = (0..labels.len())
        .map(|i| format!("<div>5/{}</div>", 11 + i))
        .collect();
    let rows: String = listings
        .iter()
        .enumerate()
        .map(|(i, listing)| {
            let class = if i % 2 == 0 { "imformation1" } else { "imformation2" };
            let button = listing
                .action
                .map(|onclick| format!(r#"<div class="listbtn" onclick="{onclick}">預約</div>"#))
                .unwrap_or_default();
            format!(
                r#"<div class="{class}">
                     <div class="textcss">
                       <div class="listtext">{}</div>
                       <div class="listtext">250</div>
                       <div class="listtext">{}</div>
                     </div>
                     <div class="courseintro">{button}</div>
                   </div>"#,
                listing.court, listing.time
            )
        })
        .collect();
    format!(
        r#"<html><body>
             <div class="datebox">{label_row}</div>
             <div class="datebox">{date_row}</div>
             <div class="selectweek" onclick="Selecttime(1)">早上</div>
             <div class="listbackground">{rows}</div>
           </body></html>"#
    )
}

pub fn clean_slot(court: &str, action: &str) -> CleanSlot {
    CleanSlot::from_raw(RawSlotEntry {
        court_name: court.to_string(),
        price: "250".to_string(),
        time_range: "9：00-10：00".to_string(),
        action: Some(action.to_string()),
        bookable: true,
    })
    .expect("test action matches the booking grammar")
}
