// API client module: a blocking HTTP session that logs in to QRZ.com the
// way a browser would and then posts an ADIF file to the logbook. All
// requests share one client so the login cookies reach the upload.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, Response};
use reqwest::header::{CONTENT_TYPE, REFERER};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::scrape::{RegexExtractor, TokenExtractor};

pub const HANDSHAKE_URL: &str = "https://www.qrz.com/login-handshake";
pub const LOGBOOK_URL: &str = "https://logbook.qrz.com/logbook";

const PAGE_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const EXCERPT_CHARS: usize = 500;
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; qrz-adif-upload/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// The four URLs a run talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub login_url: String,
    pub handshake_url: String,
    pub logbook_url: String,
    pub adif_url: String,
}

impl Endpoints {
    pub fn from_config(config: &Config) -> Self {
        Endpoints {
            login_url: config.login_url().to_string(),
            handshake_url: HANDSHAKE_URL.to_string(),
            logbook_url: LOGBOOK_URL.to_string(),
            adif_url: config.adif_url().to_string(),
        }
    }
}

/// Result of the optional pre-login handshake. A server-reported error is
/// not represented here: it comes back as `Err(Error::Handshake)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// The login page carried no ticket.
    NotOffered,
    /// A step failed in transport or returned a non-2xx status.
    Skipped { step: u8, reason: String },
    Completed { two_factor: bool },
}

/// Which page showed the logout marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    LoginResponse,
    LogbookProbe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub handshake: Handshake,
    pub verified_by: Verification,
}

/// Holds the cookie-carrying blocking client and the endpoints of one run.
pub struct ApiClient {
    client: Client,
    endpoints: Endpoints,
    extractor: Box<dyn TokenExtractor>,
}

impl ApiClient {
    pub fn new(endpoints: Endpoints) -> Result<Self> {
        Self::with_extractor(endpoints, Box::new(RegexExtractor))
    }

    pub fn with_extractor(endpoints: Endpoints, extractor: Box<dyn TokenExtractor>) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(ApiClient {
            client,
            endpoints,
            extractor,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Log in through the HTML form: fetch the page, try the handshake,
    /// submit hidden fields plus credentials and look for a logout link.
    pub fn login(&self, config: &Config) -> Result<LoginOutcome> {
        let login_url = self.endpoints.login_url.as_str();
        info!("Fetching login page: {login_url}");
        let page = self
            .client
            .get(login_url)
            .timeout(PAGE_TIMEOUT)
            .send()?
            .error_for_status()?
            .text()?;

        let handshake = match self.extractor.login_ticket(&page) {
            Some(ticket) => self.handshake(&ticket, config)?,
            None => Handshake::NotOffered,
        };

        let form = login_form(self.extractor.hidden_fields(&page), config);
        info!("Submitting login form");
        let body = self
            .client
            .post(login_url)
            .header(REFERER, login_url)
            .form(&form)
            .timeout(PAGE_TIMEOUT)
            .send()?
            .error_for_status()?
            .text()?;

        let verified_by = if has_logout_marker(&body) {
            Verification::LoginResponse
        } else {
            let probe = self
                .client
                .get(&self.endpoints.logbook_url)
                .timeout(PAGE_TIMEOUT)
                .send()?
                .error_for_status()?
                .text()?;
            if !has_logout_marker(&probe) {
                error!("Login failed: logout marker not found");
                return Err(Error::Authentication);
            }
            Verification::LogbookProbe
        };

        info!("Login successful");
        Ok(LoginOutcome {
            handshake,
            verified_by,
        })
    }

    /// Best-effort two-step handshake. Transport problems skip it; only a
    /// JSON `error` from step 2 aborts the login.
    fn handshake(&self, ticket: &str, config: &Config) -> Result<Handshake> {
        info!("Attempting login handshake (step 1)");
        let step1 = [
            ("loginTicket", ticket),
            ("username", config.username.as_str()),
            ("step", "1"),
        ];
        if let Err(err) = self.handshake_step(&step1) {
            warn!("Handshake step 1 skipped: {err}");
            return Ok(Handshake::Skipped {
                step: 1,
                reason: err.to_string(),
            });
        }

        info!("Attempting login handshake (step 2)");
        let step2 = [
            ("loginTicket", ticket),
            ("username", config.username.as_str()),
            ("password", config.password.as_str()),
            ("step", "2"),
        ];
        let resp = match self.handshake_step(&step2) {
            Ok(resp) => resp,
            Err(err) => {
                warn!("Handshake step 2 skipped: {err}");
                return Ok(Handshake::Skipped {
                    step: 2,
                    reason: err.to_string(),
                });
            }
        };

        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("application/json"));
        if !is_json {
            return Ok(Handshake::Completed { two_factor: false });
        }

        let payload: Value = match resp.json() {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Handshake step 2 skipped: {err}");
                return Ok(Handshake::Skipped {
                    step: 2,
                    reason: err.to_string(),
                });
            }
        };
        if is_truthy(payload.get("error")) {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("Handshake error")
                .to_string();
            error!("Handshake rejected: {message}");
            return Err(Error::Handshake(message));
        }
        let two_factor = is_truthy(payload.get("twofactor"));
        if two_factor {
            info!("Server requests 2FA; a code will be posted with the login form if configured");
        }
        Ok(Handshake::Completed { two_factor })
    }

    fn handshake_step(&self, form: &[(&str, &str)]) -> reqwest::Result<Response> {
        self.client
            .post(&self.endpoints.handshake_url)
            .form(form)
            .timeout(PAGE_TIMEOUT)
            .send()?
            .error_for_status()
    }

    /// Upload the configured ADIF file and check the `status` of the JSON
    /// answer. Returns the full payload on success.
    pub fn upload_adif(&self, config: &Config) -> Result<Value> {
        let adif_url = self.endpoints.adif_url.as_str();
        let path = Path::new(&config.adif_path);
        if !path.is_file() {
            error!("ADIF file not found: {}", path.display());
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        let bid = config.book_id.clone();
        let sbook = config.sbook_param();
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("upload.adi")
            .to_string();
        info!("Uploading {file_name} to {adif_url} (bid={bid}, sbook={sbook})");

        let bytes = fs::read(path)?;
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let mut form = multipart::Form::new()
            .text("bid", bid)
            .text("sbook", sbook)
            .text("op", "upfile");
        if config.allow_duplicates {
            form = form.text("dupok", "1");
        }
        if config.email_report {
            form = form.text("ereport", "1");
        }
        let form = form.part("upload_file", part);

        let body = self
            .client
            .post(adif_url)
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()?
            .error_for_status()?
            .text()?;

        let payload: Value = match serde_json::from_str(&body) {
            Ok(payload) => payload,
            Err(_) => {
                let excerpt: String = body.chars().take(EXCERPT_CHARS).collect();
                error!("Upload response is not JSON: {excerpt}");
                return Err(Error::MalformedResponse { excerpt });
            }
        };

        if payload.get("status").and_then(Value::as_str) != Some("ok") {
            error!("Upload failed: {payload}");
            return Err(Error::UploadRejected(payload));
        }

        info!("Upload completed: {payload}");
        Ok(payload)
    }
}

/// Hidden fields from the page with the credentials on top, plus the
/// optional 2FA code and trust flag.
pub fn login_form(hidden: BTreeMap<String, String>, config: &Config) -> BTreeMap<String, String> {
    let mut form = hidden;
    form.insert("username".into(), config.username.clone());
    form.insert("password".into(), config.password.clone());
    form.entry("login".into()).or_insert_with(|| "Login".into());
    if !config.twofactor_code.is_empty() {
        form.insert("2fcode".into(), config.twofactor_code.clone());
    }
    if config.trust_device {
        form.insert("trustdevice".into(), "yes".into());
    }
    form
}

pub fn has_logout_marker(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("logout") || lower.contains("log out")
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use serde_json::json;

    fn config() -> Config {
        let mut config = ConfigStore::new("configuration.json").defaults();
        config.username = "IK0ABC".into();
        config.password = "secret".into();
        config
    }

    #[test]
    fn login_form_merges_hidden_fields_and_credentials() {
        let hidden = BTreeMap::from([
            ("csrf".to_string(), "abc".to_string()),
            ("x".to_string(), "1".to_string()),
            ("username".to_string(), "".to_string()),
        ]);
        let form = login_form(hidden, &config());
        assert_eq!(form["csrf"], "abc");
        assert_eq!(form["x"], "1");
        assert_eq!(form["username"], "IK0ABC");
        assert_eq!(form["password"], "secret");
        assert_eq!(form["login"], "Login");
        assert!(!form.contains_key("2fcode"));
        assert!(!form.contains_key("trustdevice"));
    }

    #[test]
    fn login_form_keeps_page_login_value_and_adds_two_factor() {
        let hidden = BTreeMap::from([("login".to_string(), "Sign in".to_string())]);
        let mut config = config();
        config.twofactor_code = "123456".into();
        config.trust_device = true;
        let form = login_form(hidden, &config);
        assert_eq!(form["login"], "Sign in");
        assert_eq!(form["2fcode"], "123456");
        assert_eq!(form["trustdevice"], "yes");
    }

    #[test]
    fn logout_marker_is_case_insensitive() {
        assert!(has_logout_marker("<a href='/logout'>x</a>"));
        assert!(has_logout_marker("Click to LOG OUT"));
        assert!(!has_logout_marker("<a href='/login'>Log in</a>"));
    }

    #[test]
    fn truthiness_follows_json_values() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!(1))));
        assert!(is_truthy(Some(&json!("bad password"))));
    }

    #[test]
    fn endpoints_use_fixed_handshake_and_probe_urls() {
        let mut config = config();
        config.login_url.clear();
        let endpoints = Endpoints::from_config(&config);
        assert_eq!(endpoints.login_url, "https://www.qrz.com/login");
        assert_eq!(endpoints.handshake_url, HANDSHAKE_URL);
        assert_eq!(endpoints.logbook_url, LOGBOOK_URL);
        assert_eq!(endpoints.adif_url, "https://logbook.qrz.com/adif");
    }
}
