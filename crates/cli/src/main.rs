use std::process::ExitCode;

fn main() -> ExitCode {
    readmit_cli::run()
}
