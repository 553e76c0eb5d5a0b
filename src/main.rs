use clap::Parser;
use orthanc_cli::{
    CliResult,
    cmd::{self, Cli},
    context::ConfigStore,
    logging,
    output::Output,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let mut store = ConfigStore::load(cli.config.as_deref())?;

    if store.persist_migration()? {
        eprintln!(
            "Migrated legacy configuration to context 'default' in {}",
            store.path().display()
        );
    }

    let output = Output::new(cli.json, store.output_json());
    cmd::run(cli.command, &mut store, output)
}
