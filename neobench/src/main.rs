mod bolt;
mod builtin;
mod cli;
mod exit_codes;
mod output;
mod run;
mod run_error;

use clap::Parser;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit_codes::ExitCode::Success.as_i32()
                }
                _ => exit_codes::ExitCode::InvalidUsage.as_i32(),
            };
            std::process::exit(code);
        }
    };

    let code = match run::run(cli) {
        Ok(code) => code.as_i32(),
        Err(err) => {
            eprintln!("ERROR: {err}");
            err.exit_code().as_i32()
        }
    };

    std::process::exit(code);
}
