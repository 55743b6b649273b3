// Entrypoint for the uploader.
// - Keeps `main` small: find the settings file and hand it to the run.
// - Any error is reported on one line and the process exits with 1.

use std::process::ExitCode;

use qrz_adif_upload::{config::ConfigStore, ui::{run, TerminalPrompter}};

fn main() -> ExitCode {
    let result = ConfigStore::from_env()
        .map_err(anyhow::Error::from)
        .and_then(|store| run(&store, &mut TerminalPrompter));
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}
