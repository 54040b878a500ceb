use std::process::ExitCode;

fn main() -> ExitCode {
    match compartmental::runner::run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}
