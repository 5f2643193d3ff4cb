use super::super::args::*;
use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Probe(args) => super::probe::run(args).await,
        Command::Metadata(args) => super::metadata::run(args).await,
        Command::Identity(args) => match args.cmd {
            IdentitySub::Show(config) => super::identity::cmd_show(&config),
            IdentitySub::Clear(config) => super::identity::cmd_clear(&config),
        },
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
