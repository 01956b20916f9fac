pub mod pack;
pub mod show;
pub mod verify;

use super::args::{Cli, Command};
use anyhow::Result;

pub async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.cmd {
        Command::Pack(args) => pack::run(args).await,
        Command::Verify(args) => verify::run(args),
        Command::Show(args) => show::run(args),
    }
}
