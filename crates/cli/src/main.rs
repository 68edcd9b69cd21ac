use std::process::ExitCode;

fn main() -> ExitCode {
    slotguard_cli::run()
}
