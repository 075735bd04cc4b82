use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use trellis_wm::ipc::client;
use trellis_wm::ipc::protocol::MessageType;

#[derive(Parser, Debug)]
#[command(name = "trellis-cli", version)]
#[command(about = "Send messages to a running trellis instance")]
struct Args {
    /// Message type: command, get_workspaces, get_outputs, get_tree,
    /// get_marks, get_bar_config, get_version
    #[arg(short = 't', long = "type", default_value = "command")]
    message_type: String,

    /// Socket path (overrides I3SOCK and root-window discovery)
    #[arg(short = 's', long = "socket")]
    socket: Option<PathBuf>,

    /// Suppress the reply on stdout
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Payload (joined with spaces)
    #[arg(trailing_var_arg = true)]
    payload: Vec<String>,
}

fn message_type(name: &str) -> Option<MessageType> {
    match name {
        "command" => Some(MessageType::Command),
        "get_workspaces" => Some(MessageType::GetWorkspaces),
        "subscribe" => Some(MessageType::Subscribe),
        "get_outputs" => Some(MessageType::GetOutputs),
        "get_tree" => Some(MessageType::GetTree),
        "get_marks" => Some(MessageType::GetMarks),
        "get_bar_config" => Some(MessageType::GetBarConfig),
        "get_version" => Some(MessageType::GetVersion),
        _ => None,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let Some(message_type) = message_type(&args.message_type) else {
        eprintln!("unknown message type: {}", args.message_type);
        return ExitCode::from(2);
    };

    let socket = match args.socket {
        Some(socket) => socket,
        None => match client::discover_socket() {
            Ok(socket) => socket,
            Err(e) => {
                // no socket to even try: distinct from a failed connection
                eprintln!("{e:#}");
                return ExitCode::from(2);
            }
        },
    };

    let payload = args.payload.join(" ");
    match client::send(&socket, message_type as u32, payload.as_bytes()) {
        Ok((_, body)) => {
            let body = String::from_utf8_lossy(&body);
            if !args.quiet {
                println!("{body}");
            }
            // command replies carry per-command success flags
            if message_type == MessageType::Command {
                if let Ok(replies) =
                    serde_json::from_str::<Vec<serde_json::Value>>(&body)
                {
                    if replies.iter().any(|r| r["success"] == serde_json::json!(false)) {
                        return ExitCode::from(2);
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(1)
        }
    }
}
