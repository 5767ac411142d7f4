//! relayq – one binary that can start the broker *or* act as an
//! interactive client shell.
//
//  $ relayq start --config relayq.toml
//  $ relayq connect 127.0.0.1:7878
//  > declare jobs
//  > sub jobs
//  > pub jobs do the thing
//  > ack jobs <message-id>
use relayq::core::message::split_delivery;
use relayq::server::{encode_frame_into, extract_frame, Request, Response, ServerFrame};
use relayq::{load_config, start_broker, Config};

use bytes::BytesMut;
use clap::{Parser, Subcommand};
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};

use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

#[derive(Debug, Parser)]
#[command(name = "relayq", version, about = "RelayQ broker & CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the broker daemon.
    Start {
        /// Path to config TOML (env RELAYQ_CONFIG overrides)
        #[arg(short, long, default_value = "relayq.toml")]
        config: String,
    },
    /// Connect to a running broker in interactive mode.
    Connect {
        /// Broker address (host:port)
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relayq::logging::init_logging();
    let cli = Cli::parse();

    match cli.cmd {
        Command::Start { config } => {
            let cfg_path: String = std::env::var("RELAYQ_CONFIG").unwrap_or(config);
            let cfg: Config = match load_config(&cfg_path) {
                Ok(cfg) => cfg,
                Err(_) => {
                    println!("No config at {cfg_path}, using defaults");
                    Config::default()
                }
            };
            println!("📡 RelayQ broker listening on {}", cfg.server.bind_addr);
            start_broker(cfg).await?;
        }
        Command::Connect { addr } => repl(addr).await?,
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────
// Interactive REPL shell
// ───────────────────────────────────────────────────────────
async fn repl(addr: SocketAddr) -> anyhow::Result<()> {
    let mut rl: Editor<(), DefaultHistory> = DefaultEditor::new()?;

    let stream = TcpStream::connect(addr).await?;
    let (mut r, mut w) = stream.into_split();

    println!("Connected to {addr}. Type `help` for commands.");

    // Background task printing replies and incoming deliveries.
    let printer: JoinHandle<()> = tokio::spawn(async move {
        let mut inbuf = BytesMut::with_capacity(8 * 1024);
        loop {
            match r.read_buf(&mut inbuf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            while let Some(parsed) = extract_frame::<ServerFrame>(&mut inbuf) {
                match parsed {
                    Ok(ServerFrame::Delivery(raw)) => match split_delivery(&raw) {
                        Some((id, content)) => println!("<< [{id}] {content}"),
                        None => println!("<< {raw}"),
                    },
                    Ok(ServerFrame::Reply(reply)) => print_reply(reply),
                    Err(e) => println!("❌ Failed to decode frame: {e}"),
                }
            }
        }
    });

    loop {
        let Ok(line) = rl.readline("> ") else { break };
        let _ = rl.add_history_entry(line.as_str());

        let request = match parse_line(&line) {
            ParsedLine::Request(req) => req,
            ParsedLine::Help => {
                print_help();
                continue;
            }
            ParsedLine::Exit => break,
            ParsedLine::Empty => continue,
            ParsedLine::Unknown => {
                println!("Unknown cmd. Type `help`.");
                continue;
            }
        };

        let mut buf = BytesMut::with_capacity(256);
        encode_frame_into(&request, &mut buf);
        w.write_all(&buf).await?;
        w.flush().await?;
    }

    drop(w);
    let _ = printer.await;
    Ok(())
}

enum ParsedLine {
    Request(Request),
    Help,
    Exit,
    Empty,
    Unknown,
}

fn parse_line(line: &str) -> ParsedLine {
    match line.split_whitespace().collect::<Vec<_>>().as_slice() {
        [] => ParsedLine::Empty,
        ["help"] => ParsedLine::Help,
        ["exit" | "quit"] => ParsedLine::Exit,

        ["declare", queue] => ParsedLine::Request(Request::DeclareQueue {
            queue: (*queue).to_string(),
            durable: false,
        }),
        ["declare", queue, "durable"] => ParsedLine::Request(Request::DeclareQueue {
            queue: (*queue).to_string(),
            durable: true,
        }),
        ["delete", queue] => ParsedLine::Request(Request::DeleteQueue {
            queue: (*queue).to_string(),
        }),

        ["pub", queue, rest @ ..] if !rest.is_empty() => ParsedLine::Request(Request::Publish {
            queue: (*queue).to_string(),
            content: rest.join(" "),
            durable: false,
        }),
        ["pubd", queue, rest @ ..] if !rest.is_empty() => ParsedLine::Request(Request::Publish {
            queue: (*queue).to_string(),
            content: rest.join(" "),
            durable: true,
        }),

        ["sub", queue] => ParsedLine::Request(Request::Subscribe {
            queue: (*queue).to_string(),
        }),
        ["unsub", queue] => ParsedLine::Request(Request::Unsubscribe {
            queue: (*queue).to_string(),
        }),

        ["ack", queue, id] => ParsedLine::Request(Request::Ack {
            queue: (*queue).to_string(),
            message_id: (*id).to_string(),
        }),
        ["nack", queue, id] => ParsedLine::Request(Request::Nack {
            queue: (*queue).to_string(),
            message_id: (*id).to_string(),
        }),

        ["fair", queue, "on"] => ParsedLine::Request(Request::SetFairDispatch {
            queue: (*queue).to_string(),
            fair: true,
        }),
        ["fair", queue, "off"] => ParsedLine::Request(Request::SetFairDispatch {
            queue: (*queue).to_string(),
            fair: false,
        }),

        ["queues"] => ParsedLine::Request(Request::ListQueues),
        ["info", queue] => ParsedLine::Request(Request::QueueInfo {
            queue: (*queue).to_string(),
        }),

        ["agents"] => ParsedLine::Request(Request::ListAgents),
        ["agents", "on"] => ParsedLine::Request(Request::SetAgentsEnabled { enabled: true }),
        ["agents", "off"] => ParsedLine::Request(Request::SetAgentsEnabled { enabled: false }),
        ["agents", "status"] => ParsedLine::Request(Request::AgentsEnabled),
        ["rmagent", name] => ParsedLine::Request(Request::RemoveAgent {
            name: (*name).to_string(),
        }),

        _ => ParsedLine::Unknown,
    }
}

fn print_reply(reply: Response) {
    match reply {
        Response::Ok { ok } => println!("> {}", if ok { "OK" } else { "NO" }),
        Response::Queues { names } => {
            println!("> {} queue(s)", names.len());
            for name in names {
                println!("  - {name}");
            }
        }
        Response::Info { text: Some(text) } => print!("{text}"),
        Response::Info { text: None } => println!("> queue does not exist"),
        Response::Agents { agents } => {
            println!("> {} agent(s)", agents.len());
            for agent in agents {
                println!("  [{}] {}: {}", agent.priority, agent.name, agent.description);
            }
        }
        Response::Error { message } => println!("❌ {message}"),
    }
}

fn print_help() {
    println!("declare <queue> [durable] | delete <queue>");
    println!("pub <queue> <msg> | pubd <queue> <msg> (durable)");
    println!("sub <queue> | unsub <queue>");
    println!("ack <queue> <id> | nack <queue> <id>");
    println!("fair <queue> on|off");
    println!("queues | info <queue>");
    println!("agents [on|off|status] | rmagent <name>");
    println!("exit");
}
