use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

use snaprotate::PlatformError;

mod cli;
mod cmd_list;
mod cmd_rotate;
mod util;

fn init_logger(verbose: u8) {
    // -v -> info, -vv -> debug; без флагов — warn. RUST_LOG имеет приоритет.
    let levels = ["warn", "info", "debug"];
    let level = levels[usize::from(verbose).min(levels.len() - 1)];
    Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = cli::Cli::parse();
    init_logger(cli.verbose);

    if let Err(e) = run(cli) {
        // Логин/подключение — код -1, остальное — 1.
        let fatal = e
            .chain()
            .filter_map(|c| c.downcast_ref::<PlatformError>())
            .any(PlatformError::is_fatal);
        if fatal {
            error!("{:#}", e);
            std::process::exit(-1);
        }
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: cli::Cli) -> Result<()> {
    match cli.cmd {
        cli::Cmd::Rotate(args) => cmd_rotate::exec(args),
        cli::Cmd::List(args) => cmd_list::exec(args),
    }
}
