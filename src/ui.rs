// UI layer: terminal prompts with `dialoguer`, a spinner while the file
// goes up, and the run itself: settings, log, login, upload. There is no
// retry; the first error ends the run.

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

use crate::api::{ApiClient, Endpoints};
use crate::config::{Config, ConfigStore, Prompter};
use crate::logging::RunLog;

/// Asks on the terminal. `Password` hides what is typed.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn text(&mut self, prompt: &str) -> crate::Result<String> {
        let answer: String = Input::new().with_prompt(prompt).interact_text()?;
        Ok(answer)
    }

    fn secret(&mut self, prompt: &str) -> crate::Result<String> {
        let answer = Password::new().with_prompt(prompt).interact()?;
        Ok(answer)
    }
}

/// One complete run against the settings in `store`.
pub fn run(store: &ConfigStore, prompter: &mut dyn Prompter) -> Result<Value> {
    let mut config = store
        .load()
        .with_context(|| format!("loading {}", store.path().display()))?;
    store
        .ensure_interactive_fields(&mut config, prompter)
        .context("completing configuration")?;

    let log_path = config.log_file(&store.default_log_path());
    let _log = RunLog::open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;
    info!("Starting ADIF upload");

    let outcome = ApiClient::new(Endpoints::from_config(&config))
        .context("building HTTP client")
        .and_then(|client| login_and_upload(&client, &config));
    match outcome {
        Ok(payload) => {
            println!("Upload completed: {payload}");
            Ok(payload)
        }
        Err(err) => {
            error!("Run failed: {err:?}");
            Err(err)
        }
    }
}

/// Login then upload on the same session. Nothing is uploaded unless the
/// login was verified.
pub fn login_and_upload(client: &ApiClient, config: &Config) -> Result<Value> {
    client.login(config).context("logging in to QRZ.com")?;

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Uploading {}...", config.adif_path));
    spinner.enable_steady_tick(Duration::from_millis(120));
    let result = client.upload_adif(config);
    spinner.finish_and_clear();

    result.context("uploading ADIF file")
}
