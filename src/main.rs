use std::process::ExitCode;

fn main() -> ExitCode {
    gapwatch_lib::run()
}
