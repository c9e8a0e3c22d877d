//! Console example: an interactive telnet session on stdin/stdout
//!
//! Decoded output goes to stdout, each stdin line is sent to the host, and
//! the login and password prompts are answered automatically when given.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example console -- --host towel.blinkenlights.nl
//! ```
//!
//! With automatic login:
//! ```bash
//! cargo run --example console -- --host 10.0.0.1 --user admin --password secret
//! ```
//!
//! Legacy hosts:
//! ```bash
//! cargo run --example console -- --host bbs.example.org --encoding ibm866 --term vt100
//! ```

use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use telmux::{SessionBuilder, SessionRegistry, Terminal};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const SESSION: &str = "console";

/// Writes decoded text straight to stdout; the local terminal renders ANSI.
struct StdoutTerminal;

#[async_trait]
impl Terminal for StdoutTerminal {
    async fn write(&self, data: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(data.as_bytes());
        let _ = stdout.flush();
    }

    async fn error(&self, message: &str) {
        eprintln!("\n[error] {}", message);
    }

    async fn stop(&self) {
        println!("\n[connection closed]");
    }

    async fn osc(&self, data: &str) {
        // Window title
        if let Some(title) = data.strip_prefix("0;").or_else(|| data.strip_prefix("2;")) {
            eprintln!("[title] {}", title);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let mut builder = SessionBuilder::new(&args.host)
        .port(args.port)
        .terminal_type(&args.term)
        .encoding(&args.encoding)
        .timeout(Duration::from_secs(args.timeout));
    if let Some(user) = &args.user {
        builder = builder.login(&args.login_prompt, user);
    }
    if let Some(password) = &args.password {
        builder = builder.password(&args.password_prompt, password);
    }
    let config = builder.build()?;

    eprintln!("Connecting to {}...", config.socket_addr());
    let registry = Arc::new(SessionRegistry::new());
    registry
        .connect(SESSION, &config, Arc::new(StdoutTerminal))
        .await?;

    let cancel = CancellationToken::new();
    let mut pump = registry.spawn_read_loop(SESSION, cancel.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = &mut pump => break,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                let _ = (&mut pump).await;
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => registry.write(SESSION, &format!("{}\r\n", line)).await?,
                None => {
                    // stdin closed
                    registry.disconnect(SESSION).await;
                    let _ = (&mut pump).await;
                    break;
                }
            },
        }
    }

    Ok(())
}

struct Args {
    host: String,
    port: u16,
    term: String,
    encoding: String,
    user: Option<String>,
    password: Option<String>,
    login_prompt: String,
    password_prompt: String,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut port = 23u16;
        let mut term = "xterm".to_string();
        let mut encoding = "utf-8".to_string();
        let mut user = None;
        let mut password = None;
        let mut login_prompt = "login: ".to_string();
        let mut password_prompt = "Password: ".to_string();
        let mut timeout = 30u64;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    i += 1;
                    if i < args.len() {
                        host = args[i].clone();
                    }
                }
                "--port" | "-p" => {
                    i += 1;
                    if i < args.len() {
                        port = args[i].parse().unwrap_or(23);
                    }
                }
                "--term" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        term = args[i].clone();
                    }
                }
                "--encoding" | "-e" => {
                    i += 1;
                    if i < args.len() {
                        encoding = args[i].clone();
                    }
                }
                "--user" | "-u" => {
                    i += 1;
                    if i < args.len() {
                        user = Some(args[i].clone());
                    }
                }
                "--password" | "-P" => {
                    i += 1;
                    if i < args.len() {
                        password = Some(args[i].clone());
                    }
                }
                "--login-prompt" => {
                    i += 1;
                    if i < args.len() {
                        login_prompt = args[i].clone();
                    }
                }
                "--password-prompt" => {
                    i += 1;
                    if i < args.len() {
                        password_prompt = args[i].clone();
                    }
                }
                "--timeout" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().unwrap_or(30);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => {}
            }
            i += 1;
        }

        Self {
            host,
            port,
            term,
            encoding,
            user,
            password,
            login_prompt,
            password_prompt,
            timeout,
        }
    }
}

fn print_help() {
    println!("Usage: console [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -h, --host <HOST>             Host to connect to [default: localhost]");
    println!("  -p, --port <PORT>             Telnet port [default: 23]");
    println!("  -t, --term <TYPE>             Terminal type to report [default: xterm]");
    println!("  -e, --encoding <LABEL>        Character encoding [default: utf-8]");
    println!("  -u, --user <USER>             Login to send at the login prompt");
    println!("  -P, --password <PASSWORD>     Password to send at the password prompt");
    println!("      --login-prompt <TEXT>     Login prompt [default: \"login: \"]");
    println!("      --password-prompt <TEXT>  Password prompt [default: \"Password: \"]");
    println!("      --timeout <SECS>          Connection timeout [default: 30]");
    println!("      --help                    Print help");
}
