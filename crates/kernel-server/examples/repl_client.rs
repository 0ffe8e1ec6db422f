//! Interactive viewer for the session broker.
//!
//! Usage:
//!
//! ```bash
//! # Run server
//! cargo run -p kernel-server
//!
//! # In another terminal
//! cargo run -p kernel-server --example repl_client
//! ```
//!
//! Every line typed is sent as an `execute_request`; `:interrupt`
//! sends an interrupt, `:complete <text>` a completion request and
//! `:info <name>` an object info request.

use std::env;
use std::io::{self, Write};
use std::time::Duration;

use kernel_core::{Header, Request, SessionRequest};
use kernel_protocol::{encode_interrupt, encode_request};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let addr = env::var("KERNEL_CLIENT_ADDR").unwrap_or_else(|_| "127.0.0.1:9010".to_string());
    let session = format!("repl-{}", std::process::id());

    println!("Connecting to {}...", addr);
    let stream = TcpStream::connect(&addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut replies = BufReader::new(read_half).lines();
    println!("Connected. Type code, :interrupt, :complete <text>, :info <name>, or quit.\n");

    let stdin = io::stdin();
    let mut counter = 0u32;

    loop {
        print!(">> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!("\nEOF on stdin, exiting client.");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            break;
        }

        let header = Header::new(json!({ "msg_id": format!("{}-{}", session, counter), "session": session }));
        let frame = if trimmed == ":interrupt" {
            encode_interrupt(&header, &session)?
        } else if let Some(text) = trimmed.strip_prefix(":complete ") {
            let req = Request::completion(text, text.chars().count());
            encode_request(&SessionRequest::new(header, session.clone(), req))?
        } else if let Some(name) = trimmed.strip_prefix(":info ") {
            let req = Request::object_info(name);
            encode_request(&SessionRequest::new(header, session.clone(), req))?
        } else {
            counter += 1;
            let req = Request::execute(counter, trimmed);
            encode_request(&SessionRequest::new(header, session.clone(), req))?
        };

        write_half.write_all(frame.as_bytes()).await?;
        write_half.write_all(b"\n").await?;

        // Print whatever arrives shortly after; a quiet period ends the batch.
        while let Ok(next) = timeout(Duration::from_millis(200), replies.next_line()).await {
            let Some(reply) = next? else {
                println!("Server closed the connection.");
                return Ok(());
            };
            let frame: Value = serde_json::from_str(&reply)?;
            println!(
                "<< [{}] {} {}",
                frame["channel"].as_str().unwrap_or("?"),
                frame["msg_type"].as_str().unwrap_or("?"),
                frame["content"]
            );
        }
    }

    Ok(())
}
