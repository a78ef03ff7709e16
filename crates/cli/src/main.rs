use std::process::ExitCode;

fn main() -> ExitCode {
    tradepost_cli::run()
}
