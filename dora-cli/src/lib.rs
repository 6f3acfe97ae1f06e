mod cli;
mod output;
mod run;

pub use cli::Cli;
