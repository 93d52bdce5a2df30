use std::process::ExitCode;

fn main() -> ExitCode {
    scenebot_cli::run()
}
