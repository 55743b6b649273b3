// Token extraction from the QRZ login page.
//
// The login page is plain HTML with a bit of inline script. Nothing here
// parses it properly: two regular expressions pick out what the login
// form needs. When the site changes its markup, this is the file to touch,
// or swap in another `TokenExtractor`.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

static RE_LOGIN_TICKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)loginTicket['"]?\s*:\s*['"]([a-f0-9]+)['"]"#).unwrap()
});
static RE_NAME_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"name=["']([^"']+)["']\s+value=["']([^"']*)["']"#).unwrap()
});

pub trait TokenExtractor {
    /// The handshake ticket embedded in the page script, if the page has one.
    fn login_ticket(&self, html: &str) -> Option<String>;

    /// Every `name="..." value="..."` pair on the page. A later duplicate
    /// name replaces the earlier value.
    fn hidden_fields(&self, html: &str) -> BTreeMap<String, String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RegexExtractor;

impl TokenExtractor for RegexExtractor {
    fn login_ticket(&self, html: &str) -> Option<String> {
        RE_LOGIN_TICKET
            .captures(html)
            .map(|caps| caps[1].to_string())
    }

    fn hidden_fields(&self, html: &str) -> BTreeMap<String, String> {
        RE_NAME_VALUE
            .captures_iter(html)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect()
    }
}
