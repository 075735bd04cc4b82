use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use trellis_wm::common::{config, config::Config, log};
use trellis_wm::ipc::client as ipc_client;
use trellis_wm::ipc::protocol::MessageType;
use trellis_wm::ipc::server::IpcServer;
use trellis_wm::model::snapshot;
use trellis_wm::reactor::{Reactor, RunResult};
use trellis_wm::sys::{spawn, x11::XConn};

#[derive(Parser, Debug)]
#[command(name = "trellis", disable_version_flag = true)]
#[command(about = "Dynamic tiling window manager for X11")]
struct Args {
    /// Path to the configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(short = 'C', long = "validate")]
    validate: bool,

    /// Skip the startup exec entries
    #[arg(short = 'a', long = "no-autostart")]
    no_autostart: bool,

    /// Restore a layout snapshot at startup
    #[arg(short = 'L', long = "layout")]
    layout: Option<PathBuf>,

    /// Internal: restart-in-place handoff with a serialized layout
    #[arg(long = "restart", hide = true)]
    restart: Option<PathBuf>,

    /// Print the running instance's IPC socket path and exit
    #[arg(long = "get-socketpath")]
    get_socketpath: bool,

    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Command to send to the running instance
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    log::init();
    let args = Args::parse();

    if args.version {
        println!("trellis {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    if args.get_socketpath {
        return match ipc_client::discover_socket() {
            Ok(path) => {
                println!("{}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e:#}");
                ExitCode::from(1)
            }
        };
    }

    // positional arguments go to the running instance as one command
    if !args.command.is_empty() {
        let command_line = args.command.join(" ");
        return forward_command(&command_line);
    }

    let config_path = args.config.clone().unwrap_or_else(config::config_file);
    let config = match Config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(1);
        }
    };
    let issues = config.validate();
    if args.validate {
        for issue in &issues {
            println!("{issue}");
        }
        return if issues.is_empty() { ExitCode::SUCCESS } else { ExitCode::from(1) };
    }
    for issue in &issues {
        warn!(issue = %issue, "config issue");
    }

    let restored = args
        .restart
        .as_ref()
        .or(args.layout.as_ref())
        .map(|path| {
            let tree = snapshot::load_from(path);
            if args.restart.is_some() {
                std::fs::remove_file(path).ok();
            }
            tree
        });

    let x = match XConn::connect() {
        Ok(x) => x,
        Err(e) => {
            error!(error = %e, "cannot reach the X server");
            return ExitCode::from(1);
        }
    };

    let socket_path = config
        .ipc_socket
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| std::env::var("I3SOCK").ok().map(PathBuf::from))
        .unwrap_or_else(IpcServer::default_socket_path);
    let ipc = match IpcServer::bind(&socket_path) {
        Ok(ipc) => ipc,
        Err(e) => {
            error!(error = %e, "cannot bind the IPC socket");
            return ExitCode::from(1);
        }
    };

    let mut reactor = match Reactor::new(x, config, config_path.clone(), ipc, restored) {
        Ok(reactor) => reactor,
        Err(e) => {
            error!(error = %e, "startup failed");
            return ExitCode::from(1);
        }
    };

    if !args.no_autostart && args.restart.is_none() {
        for command_line in reactor.config.exec.clone() {
            spawn::spawn(&command_line);
        }
        if let Some(bar) = reactor.config.bar_command.clone() {
            spawn::spawn(&bar);
        }
    }

    match reactor.run() {
        Ok(RunResult::Exit) => {
            info!("bye");
            ExitCode::SUCCESS
        }
        Ok(RunResult::Restart) => {
            drop(reactor);
            let snapshot_path = config::snapshot_file();
            info!("restarting in place");
            let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("trellis"));
            let mut command = std::process::Command::new(exe);
            command.arg("--restart").arg(&snapshot_path);
            if let Some(config) = &args.config {
                command.arg("-c").arg(config);
            }
            let err = command.exec();
            error!(error = %err, "re-exec failed");
            ExitCode::from(1)
        }
        Err(e) => {
            // losing the X connection is fatal; the session manager decides
            // what happens next
            error!(error = %e, "event loop aborted");
            ExitCode::from(1)
        }
    }
}

fn forward_command(command_line: &str) -> ExitCode {
    let socket = match ipc_client::discover_socket() {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(1);
        }
    };
    match ipc_client::send(&socket, MessageType::Command as u32, command_line.as_bytes()) {
        Ok((_, body)) => {
            println!("{}", String::from_utf8_lossy(&body));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(1)
        }
    }
}
