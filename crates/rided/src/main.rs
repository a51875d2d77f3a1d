use std::process::ExitCode;

fn main() -> ExitCode {
    match rided::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("rided: {error}");
            ExitCode::FAILURE
        }
    }
}
