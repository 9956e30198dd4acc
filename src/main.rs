use std::process;

use clap::Parser;

use presto_admin::cli::{self, log_file};
use presto_admin::logging::{init_logging, report_fatal};
use presto_admin::Config;

#[tokio::main]
async fn main() {
    let cli = Config::parse();
    let log_file = match log_file(&cli) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };
    if let Err(err) = init_logging(&log_file, cli.verbose) {
        eprintln!("{}", err);
        process::exit(1);
    }

    let code = match cli::run_over_ssh(&cli).await {
        Ok(code) => code,
        Err(err) => {
            report_fatal(&err, &log_file);
            1
        }
    };
    process::exit(code);
}
