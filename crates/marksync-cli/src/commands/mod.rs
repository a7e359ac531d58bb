//! Subcommand implementations.

mod add;
mod delete;
mod list;
mod login;
mod logout;
mod watch;
mod whoami;

use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save the owner and store to use
    Login(login::LoginArgs),

    /// Display the active profile
    Whoami(whoami::WhoamiArgs),

    /// Forget the active profile
    Logout(logout::LogoutArgs),

    /// Add a bookmark
    Add(add::AddArgs),

    /// List bookmarks, newest first
    List(list::ListArgs),

    /// Delete a bookmark by id
    Delete(delete::DeleteArgs),

    /// Follow the bookmark list live and edit it interactively
    Watch(watch::WatchArgs),
}

pub async fn handle(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Login(args) => login::run(args).await,
        Commands::Whoami(args) => whoami::run(args).await,
        Commands::Logout(args) => logout::run(args).await,
        Commands::Add(args) => add::run(args).await,
        Commands::List(args) => list::run(args).await,
        Commands::Delete(args) => delete::run(args).await,
        Commands::Watch(args) => watch::run(args).await,
    }
}
