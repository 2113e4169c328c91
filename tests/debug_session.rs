//! End-to-end debug session scenarios over a real loopback socket.
//!
//! The "interpreter" is a scripted engine; the test thread plays both the
//! host (driving poll/on_instruction) and the IDE client. Resume commands
//! are written to the socket before the pause fires, because the pause loop
//! blocks the test thread until one arrives.

use scriptdbg::engine::{CapturedOutput, FrameInfo, ScriptEngine, ScriptException};
use scriptdbg::server::DebugServer;
use scriptdbg::{ExecState, ScriptValue};

use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

/// Interpreter stand-in with a fixed two-frame stack and canned eval
/// behavior.
struct ScriptedEngine {
    capturing: Cell<bool>,
    output: RefCell<String>,
}

impl ScriptedEngine {
    fn new() -> Self {
        Self {
            capturing: Cell::new(false),
            output: RefCell::new(String::new()),
        }
    }
}

impl ScriptEngine for ScriptedEngine {
    fn call_stack(&self) -> Vec<FrameInfo> {
        vec![
            FrameInfo {
                name: "update".into(),
                file: Some("main.rb".into()),
                line: Some(10),
            },
            FrameInfo {
                name: "main".into(),
                file: Some("main.rb".into()),
                line: Some(30),
            },
        ]
    }

    fn locals(&self, frame_index: usize) -> Vec<(String, ScriptValue)> {
        match frame_index {
            0 => vec![
                ("hp".into(), ScriptValue::Int(42)),
                ("name".into(), ScriptValue::Str("hero".into())),
            ],
            _ => vec![],
        }
    }

    fn eval(&self, code: &str, _frame_index: usize) -> Result<ScriptValue, ScriptException> {
        if self.capturing.get() {
            // The print-family output an evaluation might produce.
            if code.contains("puts") {
                self.output.borrow_mut().push_str("printed\n");
            }
        }
        match code.trim() {
            "1+1" => Ok(ScriptValue::Int(2)),
            "hp" => Ok(ScriptValue::Int(42)),
            "raise" => Err(ScriptException {
                class: "RuntimeError".into(),
                message: "raised from repl".into(),
                file: Some("(repl)".into()),
                line: Some(1),
                backtrace: vec!["(repl):1".into()],
            }),
            code if code.starts_with("def f(") => Ok(ScriptValue::Symbol("f".into())),
            _ => Ok(ScriptValue::Nil),
        }
    }

    fn begin_output_capture(&self) {
        self.capturing.set(true);
        self.output.borrow_mut().clear();
    }

    fn end_output_capture(&self) -> CapturedOutput {
        self.capturing.set(false);
        CapturedOutput {
            stdout: std::mem::take(&mut self.output.borrow_mut()),
            stderr: String::new(),
        }
    }
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(server: &mut DebugServer, engine: &dyn ScriptEngine) -> Self {
        let port = server.local_port().expect("server started");
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        // One poll to accept.
        server.poll(engine);
        assert!(server.is_attached());
        Self { stream, reader }
    }

    fn send(&mut self, json: &str) {
        self.stream.write_all(json.as_bytes()).unwrap();
        self.stream.write_all(b"\n").unwrap();
        self.stream.flush().unwrap();
    }

    /// Send and wait for the bytes to land in the server's socket before
    /// the next poll; the transport is non-blocking.
    fn send_and_settle(&mut self, json: &str) {
        self.send(json);
        thread::sleep(Duration::from_millis(50));
    }

    fn read_event(&mut self) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("event line");
        serde_json::from_str(line.trim_end()).expect("event json")
    }
}

fn started_server() -> DebugServer {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut server = DebugServer::new();
    server.start(0).expect("bind loopback port");
    server
}

#[test]
fn breakpoint_hit_pause_and_continue() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let mut client = Client::connect(&mut server, &engine);

    client.send_and_settle(r#"{"type":"set_breakpoint","file":"main.rb","line":10}"#);
    server.poll(&engine);
    assert!(server.breakpoints.has("main.rb", 10));

    // Queue the resume, then run into the breakpoint.
    client.send(r#"{"type":"continue"}"#);
    server.on_instruction(&engine, "main.rb", 10);

    let paused = client.read_event();
    assert_eq!(paused["type"], "paused");
    assert_eq!(paused["reason"], "breakpoint");
    assert_eq!(paused["file"], "main.rb");
    assert_eq!(paused["line"], 10);

    let stack = paused["stack"].as_array().unwrap();
    assert!(!stack.is_empty());
    assert_eq!(stack[0]["name"], "update");
    assert_eq!(paused["locals"]["hp"]["value"], "42");

    let continued = client.read_event();
    assert_eq!(continued["type"], "continued");
    assert_eq!(server.session.state(), ExecState::Running);

    // The hook is inert at non-breakpoint positions afterwards.
    server.on_instruction(&engine, "main.rb", 11);
    assert_eq!(server.session.state(), ExecState::Running);
}

#[test]
fn repl_eval_simple_expression() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let mut client = Client::connect(&mut server, &engine);

    client.send_and_settle(r#"{"type":"repl_eval","code":"1+1","id":5}"#);
    server.poll(&engine);

    let result = client.read_event();
    assert_eq!(result["type"], "repl_result");
    assert_eq!(result["id"], 5);
    assert_eq!(result["status"], "success");
    assert_eq!(result["result"], "2");
}

#[test]
fn repl_eval_multi_line_definition() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let mut client = Client::connect(&mut server, &engine);

    client.send_and_settle(r#"{"type":"repl_eval","code":"def f(","id":6}"#);
    server.poll(&engine);
    let first = client.read_event();
    assert_eq!(first["id"], 6);
    assert_eq!(first["status"], "incomplete");

    client.send_and_settle(r#"{"type":"repl_eval","code":")\nend","id":7}"#);
    server.poll(&engine);
    let second = client.read_event();
    assert_eq!(second["id"], 7);
    assert_eq!(second["status"], "success");
}

#[test]
fn repl_eval_error_and_output_capture() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let mut client = Client::connect(&mut server, &engine);

    client.send_and_settle(r#"{"type":"repl_eval","code":"raise","id":8}"#);
    server.poll(&engine);
    let result = client.read_event();
    assert_eq!(result["status"], "eval_error");
    assert_eq!(result["exception"]["class"], "RuntimeError");
    assert_eq!(result["exception"]["message"], "raised from repl");
    assert!(result["exception"]["backtrace"].as_array().is_some());

    client.send_and_settle(r#"{"type":"repl_eval","code":"puts 'hi'","id":9}"#);
    server.poll(&engine);
    let result = client.read_event();
    assert_eq!(result["status"], "success");
    assert_eq!(result["stdout"], "printed\n");
}

#[test]
fn repl_check_complete_and_commands() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let mut client = Client::connect(&mut server, &engine);

    client.send_and_settle(r#"{"type":"repl_check_complete","code":"def f(","id":1}"#);
    server.poll(&engine);
    let check = client.read_event();
    assert_eq!(check["type"], "repl_complete_check");
    assert_eq!(check["complete"], false);

    client.send_and_settle(r#"{"type":"repl_list_commands","id":2}"#);
    server.poll(&engine);
    let commands = client.read_event();
    assert_eq!(commands["type"], "repl_commands");
    assert!(!commands["commands"].as_array().unwrap().is_empty());

    client.send_and_settle(r#"{"type":"repl_clear_buffer","id":3}"#);
    server.poll(&engine);
    let cleared = client.read_event();
    assert_eq!(cleared["type"], "repl_result");
    assert_eq!(cleared["status"], "success");
}

#[test]
fn evaluate_in_frame_context() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let mut client = Client::connect(&mut server, &engine);

    client.send_and_settle(r#"{"type":"evaluate","expression":"hp","frame_id":0}"#);
    server.poll(&engine);
    let response = client.read_event();
    assert_eq!(response["type"], "evaluate_response");
    assert_eq!(response["success"], true);
    assert_eq!(response["result"]["type"], "integer");
    assert_eq!(response["result"]["value"], "42");
}

#[test]
fn stepping_over_a_call() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let mut client = Client::connect(&mut server, &engine);

    client.send_and_settle(r#"{"type":"set_breakpoint","file":"main.rb","line":10}"#);
    server.poll(&engine);

    // Hit the breakpoint, then step over.
    client.send(r#"{"type":"step_over"}"#);
    server.on_instruction(&engine, "main.rb", 10);
    assert_eq!(server.session.state(), ExecState::SteppingOver);
    let _paused = client.read_event();
    let _continued = client.read_event();

    // Clear the breakpoint so the next stop can only come from the step.
    client.send_and_settle(r#"{"type":"clear_breakpoint","file":"main.rb","line":10}"#);
    server.poll(&engine);

    // Same position again: not a stop. ScriptedEngine reports depth 2, the
    // depth captured at the pause, so the step completes on the next line.
    client.send(r#"{"type":"continue"}"#);
    server.on_instruction(&engine, "main.rb", 10);
    assert_eq!(server.session.state(), ExecState::SteppingOver);

    server.on_instruction(&engine, "main.rb", 11);
    let paused = client.read_event();
    assert_eq!(paused["reason"], "step");
    assert_eq!(paused["line"], 11);
    let _continued = client.read_event();
    assert_eq!(server.session.state(), ExecState::Running);
}

#[test]
fn external_pause_request() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let mut client = Client::connect(&mut server, &engine);

    client.send_and_settle(r#"{"type":"pause"}"#);
    server.poll(&engine);

    client.send(r#"{"type":"continue"}"#);
    server.on_instruction(&engine, "main.rb", 23);

    let paused = client.read_event();
    assert_eq!(paused["reason"], "pause");
    assert_eq!(paused["line"], 23);
}

#[test]
fn disconnect_while_paused_resumes_execution() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let client = Client::connect(&mut server, &engine);

    server.breakpoints.add("main.rb", 10);
    drop(client);

    // The pause loop must notice the disconnect and resume rather than hang.
    server.on_instruction(&engine, "main.rb", 10);
    assert_eq!(server.session.state(), ExecState::Running);
    assert!(!server.is_attached());
}

#[test]
fn exception_routing() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let mut client = Client::connect(&mut server, &engine);

    client.send(r#"{"type":"continue"}"#);
    server.pause_on_exception(&engine, "NoMethodError", "undefined method", "enemy.rb", 7);

    let event = client.read_event();
    assert_eq!(event["type"], "exception");
    assert_eq!(event["exception_class"], "NoMethodError");
    assert_eq!(event["file"], "enemy.rb");
    assert_eq!(event["line"], 7);
    assert!(!event["stack"].as_array().unwrap().is_empty());
    assert_eq!(server.session.state(), ExecState::Running);
}

#[test]
fn command_ordering_breakpoint_before_continue() {
    let engine = ScriptedEngine::new();
    let mut server = started_server();
    let mut client = Client::connect(&mut server, &engine);

    client.send_and_settle(r#"{"type":"set_breakpoint","file":"a.rb","line":1}"#);
    server.poll(&engine);

    // Both commands arrive in one batch while paused; the breakpoint must
    // be registered before the resume takes effect.
    client.send(r#"{"type":"set_breakpoint","file":"b.rb","line":2}"#);
    client.send(r#"{"type":"continue"}"#);
    server.on_instruction(&engine, "a.rb", 1);

    assert!(server.breakpoints.has("b.rb", 2));
    assert_eq!(server.session.state(), ExecState::Running);
}
