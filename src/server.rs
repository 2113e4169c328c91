//! Debug transport server and execution hook.
//!
//! Owns the listening socket, accepts a single IDE client, and runs the
//! blocking pause loop that services commands while the interpreter is
//! suspended. Connect with any NDJSON-speaking client on the loopback
//! interface.
//!
//! Single-threaded cooperative model: `poll` runs on the host's per-frame
//! cadence and never blocks; `enter_pause_loop` is the only blocking
//! operation and blocks deliberately. A breakpoint genuinely halts the
//! program until the client resumes it or disconnects.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;

use crate::breakpoints::BreakpointRegistry;
use crate::engine::ScriptEngine;
use crate::inspect::{locals_json, serialize_value, stack_trace_json, SerializeCtx};
use crate::protocol::{self, DebugCommand};
use crate::repl::ReplEvaluator;
use crate::session::{DebugSessionState, PauseReason, StepMode};

/// Default debug server port.
pub const DEFAULT_PORT: u16 = 7227;

/// Inbound lines longer than this disconnect the client, preventing
/// unbounded memory consumption from a misbehaving peer.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Sleep between socket polls while paused, to avoid busy-spinning.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a dispatched command asks the pause loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Stay,
    Resume,
}

/// Source position and call depth of the current pause site.
#[derive(Debug, Clone, Copy)]
struct PauseSite<'a> {
    file: &'a str,
    line: u32,
    depth: usize,
}

/// In-process debug server: socket lifecycle, breakpoint registry, session
/// state machine and REPL, all driven from the host thread.
///
/// Lifecycle: construct, `start(port)`, then call `poll` once per host
/// frame and `on_instruction` from the interpreter's per-instruction
/// callback. `shutdown` detaches everything.
pub struct DebugServer {
    listener: Option<TcpListener>,
    client: Option<TcpStream>,
    inbound: Vec<u8>,
    pub breakpoints: BreakpointRegistry,
    pub session: DebugSessionState,
    pub repl: ReplEvaluator,
    in_pause_loop: bool,
}

impl Default for DebugServer {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugServer {
    pub fn new() -> Self {
        Self {
            listener: None,
            client: None,
            inbound: Vec::new(),
            breakpoints: BreakpointRegistry::new(),
            session: DebugSessionState::new(),
            repl: ReplEvaluator::new(),
            in_pause_loop: false,
        }
    }

    /// Bind the loopback listener and begin accepting. Transport errors
    /// leave the server in the "not running" state; the host continues
    /// unaffected.
    pub fn start(&mut self, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        listener.set_nonblocking(true)?;
        info!(
            "debug server listening on 127.0.0.1:{}",
            listener.local_addr().map(|a| a.port()).unwrap_or(port)
        );
        self.listener = Some(listener);
        Ok(())
    }

    /// Drop the client and listener and clear session state. Breakpoints
    /// survive; they live for the process lifetime unless cleared.
    pub fn shutdown(&mut self) {
        if self.client.is_some() || self.listener.is_some() {
            info!("debug server shut down");
        }
        self.client = None;
        self.listener = None;
        self.inbound.clear();
        self.session.reset();
        self.repl.clear_buffer();
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.client.is_some()
    }

    /// Port actually bound, for hosts that start with port 0.
    pub fn local_port(&self) -> Option<u16> {
        self.listener
            .as_ref()
            .and_then(|l| l.local_addr().ok())
            .map(|a| a.port())
    }

    /// Fast-path guard consulted on every interpreter instruction. Must be
    /// O(1) with no allocation when there is nothing to do.
    pub fn is_active(&self) -> bool {
        self.client.is_some()
            && (self.session.is_stepping()
                || self.session.pause_pending()
                || !self.breakpoints.is_empty())
    }

    /// Per-frame service call while the interpreter is running. Accepts a
    /// client, drains inbound bytes and dispatches complete command lines.
    /// Never blocks.
    pub fn poll(&mut self, engine: &dyn ScriptEngine) {
        if self.listener.is_none() {
            return;
        }
        self.try_accept();
        if self.client.is_none() {
            return;
        }
        if !self.read_available() {
            self.drop_client();
            return;
        }
        for line in self.take_lines() {
            if let Some(cmd) = protocol::decode_command(&line) {
                self.dispatch(engine, cmd, None);
            }
        }
    }

    /// Execution hook: called by the interpreter before each instruction
    /// with the current source position. Decides whether to suspend.
    pub fn on_instruction(&mut self, engine: &dyn ScriptEngine, file: &str, line: u32) {
        if self.in_pause_loop || !self.is_active() {
            return;
        }

        // Explicit pause always wins, then breakpoints, then the step
        // condition, so the IDE's pause button is never starved by an
        // in-flight step.
        let reason = if self.session.take_pause_request() {
            Some(PauseReason::PauseCommand)
        } else if self.breakpoints.has(file, line) {
            Some(PauseReason::Breakpoint)
        } else if self.session.is_stepping()
            && self.session.step_complete(engine.call_depth(), file, line)
        {
            Some(PauseReason::Step)
        } else {
            None
        };

        if let Some(reason) = reason {
            self.enter_pause_loop(engine, reason, file, line);
        }
    }

    /// Suspend execution: send the `paused` event and service the client
    /// until a resume command arrives or it disconnects. Fully owns the
    /// calling thread for its duration.
    pub fn enter_pause_loop(
        &mut self,
        engine: &dyn ScriptEngine,
        reason: PauseReason,
        file: &str,
        line: u32,
    ) {
        if self.in_pause_loop || self.client.is_none() {
            return;
        }
        self.in_pause_loop = true;
        self.session.pause();
        debug!("paused ({}) at {}:{}", reason.as_str(), file, line);

        let stack = stack_trace_json(engine);
        let locals = locals_json(engine, 0);
        self.send_event(&protocol::paused_event(
            reason.as_str(),
            file,
            line,
            stack,
            locals,
        ));

        let depth = engine.call_depth();
        self.pause_loop(engine, file, line, depth);
        self.in_pause_loop = false;
    }

    /// Route an uncaught interpreter exception into the pause machinery:
    /// send the `exception` event, then block exactly as a breakpoint would.
    pub fn pause_on_exception(
        &mut self,
        engine: &dyn ScriptEngine,
        class: &str,
        message: &str,
        file: &str,
        line: u32,
    ) {
        if self.in_pause_loop || self.client.is_none() {
            return;
        }
        self.in_pause_loop = true;
        self.session.pause();
        info!("uncaught {} at {}:{}: {}", class, file, line, message);

        let stack = stack_trace_json(engine);
        self.send_event(&protocol::exception_event(class, message, file, line, stack));

        let depth = engine.call_depth();
        self.pause_loop(engine, file, line, depth);
        self.in_pause_loop = false;
    }

    fn pause_loop(&mut self, engine: &dyn ScriptEngine, file: &str, line: u32, depth: usize) {
        let site = PauseSite { file, line, depth };
        loop {
            if self.client.is_none() {
                // Client vanished mid-pause: resume, never hang.
                self.session.reset();
                return;
            }
            if !self.read_available() {
                self.drop_client();
                self.session.reset();
                return;
            }

            let mut resumed = false;
            for cmd_line in self.take_lines() {
                if let Some(cmd) = protocol::decode_command(&cmd_line) {
                    if self.dispatch(engine, cmd, Some(site)) == Flow::Resume {
                        resumed = true;
                    }
                }
            }
            if resumed {
                return;
            }
            thread::sleep(PAUSE_POLL_INTERVAL);
        }
    }

    /// Single decode/dispatch path shared by `poll` and the pause loop.
    /// `site` is the pause position when suspended, `None` while running.
    fn dispatch(
        &mut self,
        engine: &dyn ScriptEngine,
        cmd: DebugCommand,
        site: Option<PauseSite<'_>>,
    ) -> Flow {
        match cmd {
            DebugCommand::SetBreakpoint { file, line } => {
                self.breakpoints.add(&file, line);
                info!("breakpoint set at {}:{}", file, line);
                Flow::Stay
            }
            DebugCommand::ClearBreakpoint { file, line } => {
                self.breakpoints.remove(&file, line);
                info!("breakpoint cleared at {}:{}", file, line);
                Flow::Stay
            }
            DebugCommand::Pause => {
                if site.is_none() {
                    self.session.request_pause();
                }
                Flow::Stay
            }
            DebugCommand::Continue => match site {
                Some(_) => {
                    self.session.resume();
                    self.send_event(&protocol::continued_event());
                    Flow::Resume
                }
                None => Flow::Stay,
            },
            DebugCommand::StepOver => self.begin_step(StepMode::Over, site),
            DebugCommand::StepInto => self.begin_step(StepMode::Into, site),
            DebugCommand::StepOut => self.begin_step(StepMode::Out, site),
            DebugCommand::Evaluate {
                expression,
                frame_id,
            } => {
                let event = match engine.eval(&expression, frame_id) {
                    Ok(value) => {
                        let mut ctx = SerializeCtx::new();
                        protocol::evaluate_response(true, serialize_value(&value, &mut ctx))
                    }
                    Err(ex) => protocol::evaluate_response(
                        false,
                        serde_json::json!({
                            "type": "error",
                            "value": format!("{}: {}", ex.class, ex.message),
                        }),
                    ),
                };
                self.send_event(&event);
                Flow::Stay
            }
            DebugCommand::ReplEval { code, id } => {
                let res = self.repl.evaluate(engine, &code);
                self.send_event(&protocol::repl_result_event(id, &res));
                Flow::Stay
            }
            DebugCommand::ReplCheckComplete { code, id } => {
                let complete = self.repl.check_complete(&code);
                self.send_event(&protocol::repl_complete_check_event(id, complete));
                Flow::Stay
            }
            DebugCommand::ReplClearBuffer { id } => {
                self.repl.clear_buffer();
                let res = crate::repl::ReplEvalResult {
                    status: crate::repl::ReplStatus::Success,
                    result: Some("buffer cleared".to_string()),
                    stdout_capture: String::new(),
                    stderr_capture: String::new(),
                    execution_time_ms: 0.0,
                    exception: None,
                };
                self.send_event(&protocol::repl_result_event(id, &res));
                Flow::Stay
            }
            DebugCommand::ReplListCommands { id } => {
                let event = protocol::repl_commands_event(id, self.repl.commands());
                self.send_event(&event);
                Flow::Stay
            }
        }
    }

    /// Arm a step and resume. Step commands are only meaningful while
    /// paused; while running they are no-ops.
    fn begin_step(&mut self, mode: StepMode, site: Option<PauseSite<'_>>) -> Flow {
        match site {
            Some(site) => {
                self.session.begin_step(mode, site.depth, site.file, site.line);
                self.send_event(&protocol::continued_event());
                Flow::Resume
            }
            None => Flow::Stay,
        }
    }

    /// Accept a pending connection, if any. At most one client at a time; a
    /// second connection attempt while attached is left pending.
    fn try_accept(&mut self) {
        if self.client.is_some() {
            return;
        }
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        match listener.accept() {
            Ok((stream, addr)) => {
                if !addr.ip().is_loopback() {
                    warn!("rejected debug connection from non-loopback address {}", addr);
                    return;
                }
                if let Err(e) = stream.set_nonblocking(true) {
                    warn!("failed to set debug client non-blocking: {}", e);
                    return;
                }
                info!("debug client connected from {}", addr);
                self.inbound.clear();
                self.client = Some(stream);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("debug accept failed: {}", e),
        }
    }

    /// Drain whatever bytes the socket has into the line buffer. Returns
    /// false when the peer disconnected or errored.
    fn read_available(&mut self) -> bool {
        let Some(client) = self.client.as_mut() else {
            return false;
        };
        let mut buf = [0u8; 1024];
        loop {
            match client.read(&mut buf) {
                Ok(0) => return false,
                Ok(n) => {
                    self.inbound.extend_from_slice(&buf[..n]);
                    if self.inbound.len() > MAX_LINE_LEN && !self.inbound.contains(&b'\n') {
                        warn!(
                            "debug client sent a line over {} bytes, disconnecting",
                            MAX_LINE_LEN
                        );
                        return false;
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return true,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("debug read failed: {}", e);
                    return false;
                }
            }
        }
    }

    /// Split complete lines out of the inbound buffer; a trailing partial
    /// line stays buffered.
    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.inbound.iter().position(|&b| b == b'\n') {
            let rest = self.inbound.split_off(pos + 1);
            let mut raw = std::mem::replace(&mut self.inbound, rest);
            raw.pop(); // trailing '\n'
            lines.push(String::from_utf8_lossy(&raw).into_owned());
        }
        lines
    }

    /// Send one event line. Send failures drop the client; the host
    /// continues unaffected.
    fn send_event(&mut self, event: &Value) {
        let Some(client) = self.client.as_mut() else {
            return;
        };
        let line = protocol::encode_line(event);
        let result = client.write_all(line.as_bytes()).and_then(|_| client.flush());
        if let Err(e) = result {
            warn!("debug send failed: {}", e);
            self.drop_client();
        }
    }

    fn drop_client(&mut self) {
        if self.client.take().is_some() {
            info!("debug client disconnected");
        }
        self.inbound.clear();
        self.session.reset();
        self.repl.clear_buffer();
    }
}
