//! Pause/step state machine.
//!
//! One session exists per debug server. The execution hook reads it on every
//! interpreter instruction; the transport server's command dispatch is the
//! only other writer. Single-threaded by construction, so no locking.

/// Execution state of the debugged interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Running,
    Paused,
    SteppingOver,
    SteppingInto,
    SteppingOut,
}

/// Kind of step requested while paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Over,
    Into,
    Out,
}

/// Why execution was suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Breakpoint,
    Step,
    PauseCommand,
}

impl PauseReason {
    /// Wire name used in the `paused` event.
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::Breakpoint => "breakpoint",
            PauseReason::Step => "step",
            PauseReason::PauseCommand => "pause",
        }
    }
}

/// Session bookkeeping: current state plus the call depth and source
/// position captured when a step began, and the edge-triggered external
/// pause request.
#[derive(Debug)]
pub struct DebugSessionState {
    state: ExecState,
    step_start_depth: usize,
    step_start_file: String,
    step_start_line: u32,
    pause_requested: bool,
}

impl Default for DebugSessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugSessionState {
    pub fn new() -> Self {
        Self {
            state: ExecState::Running,
            step_start_depth: 0,
            step_start_file: String::new(),
            step_start_line: 0,
            pause_requested: false,
        }
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn is_stepping(&self) -> bool {
        matches!(
            self.state,
            ExecState::SteppingOver | ExecState::SteppingInto | ExecState::SteppingOut
        )
    }

    /// Enter the paused state, cancelling any in-flight step.
    pub fn pause(&mut self) {
        self.state = ExecState::Paused;
        self.pause_requested = false;
    }

    /// Resume free running.
    pub fn resume(&mut self) {
        self.state = ExecState::Running;
    }

    /// Arm a step from the given position and call depth. Stepping also
    /// resumes execution; the hook pauses again once the stop condition
    /// holds.
    pub fn begin_step(&mut self, mode: StepMode, depth: usize, file: &str, line: u32) {
        self.state = match mode {
            StepMode::Over => ExecState::SteppingOver,
            StepMode::Into => ExecState::SteppingInto,
            StepMode::Out => ExecState::SteppingOut,
        };
        self.step_start_depth = depth;
        self.step_start_file = file.to_string();
        self.step_start_line = line;
    }

    /// Stop condition for the current step, evaluated once per instruction.
    ///
    /// - step over: `depth <= start depth` and position moved
    /// - step into: position moved, any depth
    /// - step out: `depth < start depth`
    pub fn step_complete(&self, depth: usize, file: &str, line: u32) -> bool {
        let moved = file != self.step_start_file || line != self.step_start_line;
        match self.state {
            ExecState::SteppingOver => depth <= self.step_start_depth && moved,
            ExecState::SteppingInto => moved,
            ExecState::SteppingOut => depth < self.step_start_depth,
            _ => false,
        }
    }

    /// Edge-triggered external pause request (the IDE's pause button).
    pub fn request_pause(&mut self) {
        self.pause_requested = true;
    }

    /// Consume the pause request if one is pending.
    pub fn take_pause_request(&mut self) -> bool {
        std::mem::take(&mut self.pause_requested)
    }

    pub fn pause_pending(&self) -> bool {
        self.pause_requested
    }

    /// Clear all stale step/pause flags; invoked on client disconnect.
    pub fn reset(&mut self) {
        self.state = ExecState::Running;
        self.pause_requested = false;
        self.step_start_depth = 0;
        self.step_start_file.clear();
        self.step_start_line = 0;
    }
}
