use std::process::ExitCode;

fn main() -> ExitCode {
    mooai_cli::run()
}
