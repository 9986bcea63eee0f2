use std::process::ExitCode;

fn main() -> ExitCode {
    permitdesk_cli::run()
}
