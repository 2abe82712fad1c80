//! Binary entrypoint for the `tasklock` CLI.

use std::process::ExitCode;

fn main() -> ExitCode {
    // A missing .env is fine; TASKLOCK_DIR / TASKLOCK_OWNER may come from it.
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match tasklock::run(std::env::args_os()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
