mod cli;
mod exit_codes;
mod logging;
mod run;
mod run_error;

use clap::Parser;

fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit_codes::ExitCode::Success.as_i32()
                }
                _ => exit_codes::ExitCode::Usage.as_i32(),
            };
            std::process::exit(code);
        }
    };

    logging::init_logging(&cli.log_level);

    let code = match run::run(cli) {
        Ok(code) => code.as_i32(),
        Err(err) => {
            eprintln!("{err}");
            err.exit_code().as_i32()
        }
    };

    std::process::exit(code);
}
