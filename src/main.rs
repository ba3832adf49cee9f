use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use mibridge::channel::SessionChannel;
use mibridge::config::{self, Config, InitScript};
use mibridge::engine::Engine;
use mibridge::event::{EventLoop, Exit};
use mibridge::link::NetbeansLink;
use mibridge::session::Session;
use mibridge::table::CommandTable;
use mibridge::version;
use std::fs::File;
use std::os::fd::AsFd;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Debugger program
    #[clap(long, default_value = "gdb")]
    pgm: String,

    /// Terminal of the debuggee (default: this terminal, or the null device)
    #[clap(long)]
    tty: Option<PathBuf>,

    /// Run the debugger on pipes instead of a pseudo terminal (also set by MIBRIDGE_PIPES)
    #[clap(long)]
    pipes: bool,

    /// Log level, overrides RUST_LOG
    #[clap(long)]
    level: Option<LevelFilter>,

    /// Write logs to this file instead of stderr
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// Extra debugger arguments
    #[clap(last = true)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    mibridge::log::init(args.level, args.log_file.as_deref()).context("logger setup")?;

    let config = Config {
        pgm: args.pgm,
        terminal: args.tty.unwrap_or_else(config::default_terminal),
        force_pipes: args.pipes || config::pipes_from_env(),
        extra_args: args.args,
    };
    log::debug!(target: "bridge", "{config:?}");

    let version = version::probe(&config.pgm).with_context(|| format!("probe {}", config.pgm))?;
    let table = CommandTable::introspect(&config.pgm).context("command table")?;
    let init = InitScript::create().context("init script")?;

    let mut channel = SessionChannel::start(&config.argv(init.path()), config.force_pipes)
        .with_context(|| format!("start gdb {version}"))?;
    let mut session = Session::new(Engine::default(), table, NetbeansLink::stdio());

    // unbuffered editor input, readiness of the descriptor must match what is left to read
    let editor = File::from(std::io::stdin().as_fd().try_clone_to_owned()?);
    let exit = EventLoop::new(editor).run(&mut channel, &mut session);
    let termination = session.close(&mut channel);
    match exit? {
        Exit::ProcessExited(t) => log::info!(target: "bridge", "session ended: {t}"),
        Exit::EditorClosed => {
            log::info!(target: "bridge", "editor gone, debugger {termination:?}")
        }
    }
    Ok(())
}
