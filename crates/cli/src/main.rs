use std::process::ExitCode;

fn main() -> ExitCode {
    agentforge_cli::run()
}
