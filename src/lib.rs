// Library root
// -----------
// This crate exposes the pieces the `qrz-adif-upload` binary strings
// together: load the settings, log in to QRZ.com, upload an ADIF file.
//
// Module responsibilities:
// - `config`: the persisted JSON settings and interactive completion.
// - `scrape`: pulls the login ticket and hidden form fields out of the
//   login page HTML. Kept apart because it follows the site's markup.
// - `api`: the cookie-holding HTTP session, login and upload flows.
// - `logging`: the per-run log file.
// - `ui`: terminal prompts, spinner and the run orchestration.
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod scrape;
pub mod ui;

pub use error::{Error, Result};
