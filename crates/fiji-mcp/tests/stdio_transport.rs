//! Integration test for stdio MCP transport
//!
//! Drives the `fiji-mcp mcp` binary over stdin/stdout with the sandbox host,
//! so no imaging application is needed.

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Session {
    fn start() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_fiji-mcp"))
            .args(["--host", "sandbox", "mcp"])
            .env("FIJI_MCP_LOG_LEVEL", "warn")
            .env_remove("RUST_LOG")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to start fiji-mcp mcp");

        let stdin = child.stdin.take().expect("stdin");
        let stdout = BufReader::new(child.stdout.take().expect("stdout"));
        let mut session = Self {
            child,
            stdin,
            stdout,
        };

        let init = session.request(
            1,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0"}
            }),
        );
        assert!(init["result"]["serverInfo"].is_object(), "Missing serverInfo");
        session.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
        session
    }

    fn send(&mut self, message: Value) {
        writeln!(self.stdin, "{}", message).expect("Failed to write to stdin");
        self.stdin.flush().expect("flush");
    }

    /// Send a request and read lines until its response arrives.
    fn request(&mut self, id: u64, method: &str, params: Value) -> Value {
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}));

        loop {
            let mut line = String::new();
            let read = self.stdout.read_line(&mut line).expect("read stdout");
            assert!(read > 0, "fiji-mcp closed stdout before answering {}", method);

            let Ok(message) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            if message["id"] == id {
                return message;
            }
        }
    }

    fn call_tool(&mut self, id: u64, name: &str, arguments: Value) -> Value {
        let response = self.request(
            id,
            "tools/call",
            json!({"name": name, "arguments": arguments}),
        );
        response["result"].clone()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn text(result: &Value) -> &str {
    result["content"][0]["text"].as_str().expect("text content")
}

#[test]
fn test_stdio_initialize() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_fiji-mcp"))
        .args(["--host", "sandbox", "mcp"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start fiji-mcp mcp");

    let mut stdin = child.stdin.take().expect("Failed to open stdin");

    let init_request = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test","version":"1.0"}}}"#;
    writeln!(stdin, "{}", init_request).expect("Failed to write to stdin");

    let init_notification = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
    writeln!(stdin, "{}", init_notification).expect("Failed to write to stdin");

    // Close stdin to signal EOF
    drop(stdin);

    let output = child.wait_with_output().expect("Failed to get output");
    let stdout = String::from_utf8_lossy(&output.stdout);

    let first_line = stdout.lines().next().expect("No output received");
    let response: Value =
        serde_json::from_str(first_line).expect("Failed to parse response as JSON");

    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["serverInfo"]["name"], "fiji-mcp");
    assert!(
        response["result"]["capabilities"]["tools"].is_object(),
        "Missing tools capability"
    );
    assert!(response["result"]["instructions"]
        .as_str()
        .unwrap()
        .contains("execute_groovy"));
}

#[test]
fn test_stdio_lists_tools() {
    let mut session = Session::start();
    let response = session.request(2, "tools/list", json!({}));

    let mut names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    names.sort();

    assert_eq!(
        names,
        vec![
            "execute_groovy",
            "getScriptFromEditor",
            "get_opened_images_information",
            "show_or_update_script_in_editor",
        ]
    );
}

#[test]
fn test_stdio_tool_session() {
    let mut session = Session::start();

    let images = session.call_tool(2, "get_opened_images_information", json!({}));
    assert_eq!(text(&images), "[]");

    let result = session.call_tool(3, "execute_groovy", json!({"groovy_code": "return 42"}));
    let report: Value = serde_json::from_str(text(&result)).unwrap();
    assert_eq!(report["executionSuccess"], true);
    assert_eq!(report["returnedObjectClass"], "integer");
    assert_eq!(report["returnedObject"], 42);

    let result = session.call_tool(
        4,
        "execute_groovy",
        json!({"groovy_code": "invalid syntax !!!"}),
    );
    assert_ne!(result["isError"], true);
    let report: Value = serde_json::from_str(text(&result)).unwrap();
    assert_eq!(report["executionSuccess"], false);
    assert!(!report["errorMessage"].as_str().unwrap().is_empty());

    session.call_tool(
        5,
        "show_or_update_script_in_editor",
        json!({"groovy_code": "return 1", "script_title": "a.ext"}),
    );
    session.call_tool(
        6,
        "show_or_update_script_in_editor",
        json!({"groovy_code": "return 2", "script_title": "a.ext"}),
    );
    let script = session.call_tool(7, "getScriptFromEditor", json!({"script_title": "a.ext"}));
    assert_eq!(text(&script), "return 2");

    let missing = session.call_tool(8, "getScriptFromEditor", json!({"script_title": "nope"}));
    assert_eq!(missing["isError"], true);
}

#[test]
fn test_stdio_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_fiji-mcp"))
        .arg("mcp")
        .arg("--help")
        .output()
        .expect("Failed to run fiji-mcp mcp --help");

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(
        combined.contains("stdio"),
        "Help should mention stdio: {}",
        combined
    );
}
