//! Minimal MCP server over stdio for integration tests.
//!
//! Flags:
//!   --exit-after-initialize   exit once the `initialized` notification arrives
//!   --fail-initialize         answer `initialize` with a JSON-RPC error
//!   --slow-list-ms <N>        delay every `tools/list` answer by N milliseconds
//!   --name <NAME>             server name reported in the handshake

use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::time::Duration;

#[derive(Default)]
struct Options {
    exit_after_initialize: bool,
    fail_initialize: bool,
    slow_list: Option<Duration>,
    name: Option<String>,
}

fn parse_args() -> Options {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--exit-after-initialize" => options.exit_after_initialize = true,
            "--fail-initialize" => options.fail_initialize = true,
            "--slow-list-ms" => {
                options.slow_list = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis);
            }
            "--name" => options.name = args.next(),
            other => eprintln!("ignoring unknown flag {}", other),
        }
    }
    options
}

fn tools() -> Value {
    json!([
        {
            "name": "echo",
            "description": "Return the arguments as text",
            "inputSchema": {"type": "object"}
        },
        {
            "name": "fail",
            "description": "Always returns an error",
            "inputSchema": {"type": "object"}
        }
    ])
}

fn error(id: &Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

fn result(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn handle(options: &Options, method: &str, id: &Value, params: &Value) -> Value {
    match method {
        "initialize" if options.fail_initialize => error(id, -32603, "initialization refused"),
        "initialize" => result(
            id,
            json!({
                "protocolVersion": params
                    .get("protocolVersion")
                    .cloned()
                    .unwrap_or_else(|| json!("2025-03-26")),
                "capabilities": {"tools": {}},
                "serverInfo": {
                    "name": options.name.as_deref().unwrap_or("mock-mcp-backend"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        ),
        "ping" => result(id, json!({})),
        "tools/list" => {
            if let Some(delay) = options.slow_list {
                std::thread::sleep(delay);
            }
            result(id, json!({"tools": tools()}))
        }
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            match name {
                "echo" => result(
                    id,
                    json!({
                        "content": [{"type": "text", "text": arguments.to_string()}],
                        "isError": false
                    }),
                ),
                "fail" => error(id, -32000, "tool failed"),
                _ => error(id, -32602, &format!("unknown tool: {}", name)),
            }
        }
        _ => error(id, -32601, &format!("method not found: {}", method)),
    }
}

fn main() -> io::Result<()> {
    let options = parse_args();
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let message: Value = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                eprintln!("unparsable input: {}", e);
                continue;
            }
        };

        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let Some(id) = message.get("id") else {
            if method == "notifications/initialized" && options.exit_after_initialize {
                eprintln!("exiting after initialize");
                return Ok(());
            }
            continue;
        };

        let response = handle(&options, method, id, &params);
        writeln!(stdout, "{}", response)?;
        stdout.flush()?;
    }

    Ok(())
}
