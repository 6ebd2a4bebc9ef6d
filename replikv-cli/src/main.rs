use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use colored::Colorize;
use replikv_server::{Connection, Frame, Request};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "replikv-cli")]
#[command(about = "replikv CLI - Redis-like command-line interface", long_about = None)]
#[command(version, disable_help_flag = true)]
struct Args {
    /// Server host
    #[arg(short = 'h', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short = 'p', long, default_value = "6389")]
    port: u16,

    /// Command to execute (if not in interactive mode)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

struct ReplikvClient {
    addr: String,
    conn: Option<Connection>,
}

impl ReplikvClient {
    fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            conn: None,
        }
    }

    /// Reuse the open connection or dial a new one
    async fn connection(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            let conn = Connection::connect(self.addr.as_str())
                .await
                .with_context(|| format!("could not connect to {}", self.addr))?;
            self.conn = Some(conn);
        }
        self.conn
            .as_mut()
            .context("connection unavailable")
    }

    async fn execute_command(&mut self, parts: Vec<String>) -> Result<String> {
        let Some((cmd, args)) = parts.split_first() else {
            bail!("empty command");
        };
        if cmd.eq_ignore_ascii_case("HELP") {
            return Ok(help_text());
        }
        if cmd.eq_ignore_ascii_case("SYNC") {
            return self.stream_sync(args).await;
        }

        let start = Instant::now();
        let request = Request::new(cmd.clone(), args.iter().cloned());
        let reply = match self.round_trip(request).await {
            Ok(reply) => reply,
            Err(e) => {
                // Drop the broken connection so the next command redials
                self.conn = None;
                return Err(e);
            }
        };

        let elapsed = start.elapsed();
        Ok(format!(
            "{}\n{}",
            render(&reply),
            format!("({:.2?})", elapsed).dimmed()
        ))
    }

    async fn round_trip(&mut self, request: Request) -> Result<Frame> {
        let conn = self.connection().await?;
        conn.send_request(request).await?;
        match conn.read_frame().await? {
            Some(frame) => Ok(frame),
            None => {
                self.conn = None;
                bail!("server closed the connection")
            }
        }
    }

    /// Print streamed records until the server closes or Ctrl-C
    async fn stream_sync(&mut self, args: &[String]) -> Result<String> {
        let offset = args.first().cloned().unwrap_or_else(|| "0".to_string());
        // The stream never ends on its own, so use a dedicated connection
        let mut conn = Connection::connect(self.addr.as_str())
            .await
            .with_context(|| format!("could not connect to {}", self.addr))?;
        conn.send_request(Request::new("sync", [offset])).await?;
        info!("{}", "Streaming records, Ctrl-C to stop".dimmed());

        let mut received = 0u64;
        loop {
            tokio::select! {
                frame = conn.read_frame() => match frame? {
                    Some(frame) => {
                        received += 1;
                        info!("{}", render(&frame));
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        Ok(format!("{} records received", received).dimmed().to_string())
    }
}

/// redis-cli style rendering with colour for status, errors and nil
fn render(frame: &Frame) -> String {
    match frame {
        Frame::Simple(s) => s.green().to_string(),
        Frame::Error(_) => frame.to_string().red().to_string(),
        Frame::Null => frame.to_string().dimmed().to_string(),
        _ => frame.to_string(),
    }
}

/// Split a command line on whitespace, keeping double-quoted runs together
fn split_line(line: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            '\\' if in_quotes => match chars.next() {
                Some('n') => current.push('\n'),
                Some(other) => current.push(other),
                None => bail!("dangling escape"),
            },
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    parts.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        bail!("unbalanced quotes");
    }
    if has_token {
        parts.push(current);
    }
    Ok(parts)
}

fn help_text() -> String {
    format!(
        r#"{}
  SET key value              Set key to hold value
  GET key                    Get the value of key
  DEL key                    Delete key
  PING [message]             Check the connection

{}
  SLAVEOF host port          Replicate from a primary
  REPLICAOF host port        Same as SLAVEOF
  SYNC [offset]              Stream the keyspace and live writes

{}
  HELP                       Show this help
  QUIT / EXIT                Leave the CLI"#,
        "Keys:".bold().yellow(),
        "Replication:".bold().yellow(),
        "Other:".bold().yellow()
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .with_target(false)
        .with_level(false)
        .without_time()
        .init();

    let args = Args::parse();
    let mut client = ReplikvClient::new(&args.host, args.port);

    if !args.command.is_empty() {
        match client.execute_command(args.command).await {
            Ok(output) => {
                info!("{}", output);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "{}", format!("Error: {}", e).red());
                std::process::exit(1);
            }
        }
    } else {
        run_interactive(client, &args.host, args.port).await
    }
}

async fn run_interactive(mut client: ReplikvClient, host: &str, port: u16) -> Result<()> {
    info!(
        "{}",
        format!("replikv CLI v{}", env!("CARGO_PKG_VERSION"))
            .bold()
            .cyan()
    );
    info!("Connecting to {}:{}", host, port);
    info!("Type {} for available commands\n", "HELP".bold());

    let mut rl = DefaultEditor::new()?;

    loop {
        let prompt = format!("{}> ", format!("{}:{}", host, port).green());
        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                rl.add_history_entry(&line)?;

                let parts = match split_line(&line) {
                    Ok(parts) if !parts.is_empty() => parts,
                    Ok(_) => continue,
                    Err(e) => {
                        error!("{}", format!("Error: {}", e).red());
                        continue;
                    }
                };

                let cmd = parts[0].to_uppercase();
                if cmd == "QUIT" || cmd == "EXIT" {
                    info!("Goodbye!");
                    break;
                }

                match client.execute_command(parts).await {
                    Ok(output) => info!("{}", output),
                    Err(e) => error!(error = %e, "{}", format!("Error: {}", e).red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                info!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                info!("Goodbye!");
                break;
            }
            Err(e) => {
                error!("Readline error: {}", e);
                break;
            }
        }
    }

    Ok(())
}
