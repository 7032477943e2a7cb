//! Stand-in walker server for integration testing.
//!
//! Accepts the same command line as the real server (`start <entry> -p <port>`),
//! requires the entrypoint to exist in its working directory, and answers
//! `POST /walker/Supervisor` with a `reports` envelope. Queries are routed by
//! keyword:
//!
//! - "compare" → `ResearchAgent` (`summary`)
//! - digits or arithmetic operators → `MathAgent` (`response`)
//! - anything else → `ConceptAgent` (`response`)
//!
//! # Special behaviors (`STUB_MODE`)
//!
//! - `reports` (default): routed `reports` envelope
//! - `fallback`: bare `{"response": ...}` body with no `reports`
//! - `error500`: every request answers HTTP 500
//! - `misroute`: every query is attributed to `ConceptAgent`
//! - `exit`: exits with code 3 before binding
//! - `hang`: accepts connections but never answers
//! - `ignore-term`: ignores SIGTERM, so only SIGKILL stops it
//!
//! `STUB_DELAY_MS` delays binding. `STUB_EXIT_AFTER=<n>` exits with code 4
//! after answering `n` requests.

use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::thread;
use std::time::Duration;

const ROUTE: &str = "/walker/Supervisor";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (entry, port) = match parse_args(&args) {
        Some(parsed) => parsed,
        None => {
            eprintln!("usage: stub-walker-server start <entry> -p <port>");
            std::process::exit(2);
        }
    };
    if !Path::new(&entry).is_file() {
        eprintln!("stub-walker-server: entrypoint {entry} not found");
        std::process::exit(2);
    }

    let mode = std::env::var("STUB_MODE").unwrap_or_else(|_| "reports".to_string());
    if mode == "exit" {
        eprintln!("stub-walker-server: exiting early as requested");
        std::process::exit(3);
    }
    if mode == "ignore-term" {
        ignore_sigterm();
    }
    if let Some(delay) = env_u64("STUB_DELAY_MS") {
        thread::sleep(Duration::from_millis(delay));
    }
    let exit_after = env_u64("STUB_EXIT_AFTER");

    let listener = match TcpListener::bind(("0.0.0.0", port)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("stub-walker-server: bind {port}: {e}");
            std::process::exit(1);
        }
    };

    let mut held = Vec::new();
    let mut served = 0u64;
    for stream in listener.incoming() {
        let Ok(stream) = stream else { continue };
        if mode == "hang" {
            held.push(stream);
            continue;
        }
        if handle_connection(stream, &mode) {
            served += 1;
        }
        if exit_after.is_some_and(|n| served >= n) {
            std::process::exit(4);
        }
    }
}

fn parse_args(args: &[String]) -> Option<(String, u16)> {
    match args {
        [start, entry, flag, port] if start == "start" && flag == "-p" => {
            Some((entry.clone(), port.parse().ok()?))
        }
        _ => None,
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(unix)]
fn ignore_sigterm() {
    // SAFETY: installing SIG_IGN has no preconditions.
    unsafe {
        libc::signal(libc::SIGTERM, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_sigterm() {}

/// Serve one request. Returns `true` if it was a request (not a bare probe).
fn handle_connection(stream: TcpStream, mode: &str) -> bool {
    let mut reader = match stream.try_clone() {
        Ok(s) => BufReader::new(s),
        Err(_) => return false,
    };

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        // Readiness probes connect and close without sending anything.
        return false;
    }

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
            break;
        }
        if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = v.trim().parse().unwrap_or(0);
        }
    }
    let mut body = vec![0u8; content_length];
    if reader.read_exact(&mut body).is_err() {
        return false;
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();

    let (status, reply) = if method != "POST" || path != ROUTE {
        ("404 Not Found", json!({ "error": format!("no route for {method} {path}") }))
    } else if mode == "error500" {
        ("500 Internal Server Error", json!({ "error": "walker failed" }))
    } else {
        let query = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|v| v.get("query").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default();
        ("200 OK", answer(&query, mode))
    };

    write_response(stream, status, &reply);
    true
}

fn answer(query: &str, mode: &str) -> Value {
    let (agent, field, text) = route(query);
    let agent = if mode == "misroute" { "ConceptAgent" } else { agent };
    if mode == "fallback" {
        return json!({ "response": text });
    }
    json!({ "reports": [{ "agent": agent, field: text }] })
}

fn route(query: &str) -> (&'static str, &'static str, String) {
    let lower = query.to_lowercase();
    if lower.contains("compare") {
        ("ResearchAgent", "summary", format!("Summary of: {query}"))
    } else if query.chars().any(|c| c.is_ascii_digit() || "+*/".contains(c)) {
        ("MathAgent", "response", "35".to_string())
    } else {
        ("ConceptAgent", "response", format!("Explanation of: {query}"))
    }
}

fn write_response(mut stream: TcpStream, status: &str, body: &Value) {
    let body = body.to_string();
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body.as_bytes());
    let _ = stream.flush();
}
