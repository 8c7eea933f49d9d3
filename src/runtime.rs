// Maneuver runtime: 50 Hz command loop with a single-maneuver executor
// Note: maneuvers block until both wheels arrive, so they run on their own
// thread; the loop keeps taking commands, publishing diagnostics and
// watching the teleop keep-alive meanwhile.

use std::error::Error;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, SIM_STEP_DT, TOPIC_CMD_MANEUVER, TOPIC_DIAGNOSTICS, TOPIC_HEALTH,
    TOPIC_OUTCOME,
};
use crate::link::{LinkError, TextLink};
use crate::messages::{ManeuverCommand, ManeuverOutcome, OutcomeStatus, RuntimeHealth};
use crate::motion::sim::simulated_pair;
use crate::motion::{
    Actuator, Calibration, CancelToken, DiagnosticsSink, Encoders, LogSink, MotionController,
    MotionError, MotionReport, RunLimits,
};

type BoxError = Box<dyn Error + Send + Sync>;

/// Where commands come from
#[derive(Debug, Clone)]
pub enum CommandSource {
    Zenoh,
    Serial { port: String, baudrate: u32 },
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub calibration: Calibration,
    pub source: CommandSource,
    /// Bound on every coordinated run; `None` blocks until arrival
    pub run_timeout: Option<Duration>,
}

/// Everything the runtime sends back out
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Report(MotionReport),
    Outcome(ManeuverOutcome),
}

/// Run one command against the controller
pub fn dispatch<A: Actuator>(
    ctl: &mut MotionController<A>,
    cmd: &ManeuverCommand,
) -> Result<(), MotionError> {
    match *cmd {
        ManeuverCommand::Forward { distance_cm } => ctl.forward(distance_cm),
        ManeuverCommand::Reverse { distance_cm } => ctl.reverse(distance_cm),
        ManeuverCommand::Pivot { direction } => ctl.pivot(direction),
        ManeuverCommand::Spin {
            direction,
            angle_deg,
        } => ctl.spin(direction, angle_deg),
        ManeuverCommand::Turn { direction } => ctl.turn(direction),
        ManeuverCommand::Stop => {
            ctl.stop();
            Ok(())
        }
        ManeuverCommand::Circle {
            diameter_cm,
            direction,
        } => ctl.move_circle(diameter_cm, direction),
        ManeuverCommand::Figure8 { diameter_cm } => ctl.move_figure8(diameter_cm),
        ManeuverCommand::Angle { angle_deg } => ctl.go_to_angle(angle_deg),
        ManeuverCommand::Goal { x, y } => ctl.go_to_goal(x, y),
        ManeuverCommand::Square { side_cm } => ctl.make_square(side_cm),
        ManeuverCommand::Drive { teleop } => ctl.teleop(teleop),
        ManeuverCommand::EncoderSweep => ctl.encoder_sweep(),
    }
}

fn outcome(command: ManeuverCommand, result: Result<(), MotionError>) -> ManeuverOutcome {
    let (status, error) = match result {
        Ok(()) => (OutcomeStatus::Completed, None),
        Err(MotionError::Cancelled) => (OutcomeStatus::Cancelled, None),
        Err(MotionError::Busy) => (OutcomeStatus::Rejected, Some(MotionError::Busy.to_string())),
        Err(e) => (OutcomeStatus::Failed, Some(e.to_string())),
    };
    ManeuverOutcome {
        command,
        status,
        error,
    }
}

struct Job {
    id: u64,
    command: ManeuverCommand,
    cancel: CancelToken,
}

enum WorkerMessage {
    Report(MotionReport),
    Finished { id: u64, outcome: ManeuverOutcome },
}

/// Logs each report and forwards it to the runtime loop
struct WorkerSink {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    log: LogSink,
}

impl DiagnosticsSink for WorkerSink {
    fn report(&mut self, report: &MotionReport) {
        self.log.report(report);
        let _ = self.tx.send(WorkerMessage::Report(report.clone()));
    }
}

struct Running {
    id: u64,
    command: ManeuverCommand,
    cancel: CancelToken,
    refreshed_at: Instant,
}

/// Owns the executor thread. Only one job is in flight at a time.
pub struct Executor {
    jobs: std_mpsc::Sender<Job>,
    events: mpsc::UnboundedReceiver<WorkerMessage>,
    current: Option<Running>,
    next_id: u64,
}

impl Executor {
    /// Move the controller onto its own thread
    pub fn spawn<A>(ctl: MotionController<A>, base_limits: RunLimits) -> std::io::Result<Self>
    where
        A: Actuator + Send + 'static,
    {
        let (jobs, job_rx) = std_mpsc::channel::<Job>();
        let (tx, events) = mpsc::unbounded_channel();
        let mut ctl = ctl.with_sink(WorkerSink {
            tx: tx.clone(),
            log: LogSink,
        });

        thread::Builder::new()
            .name("motion-executor".into())
            .spawn(move || {
                for job in job_rx {
                    let mut limits = base_limits.clone().with_cancel(job.cancel);
                    if job.command.teleop().is_some() {
                        // Continuous drive is bounded by the keep-alive watchdog instead
                        limits.timeout = None;
                    }
                    ctl.set_limits(limits);

                    let result = dispatch(&mut ctl, &job.command);
                    if let Err(e) = &result {
                        warn!("{} failed: {}", job.command, e);
                    }
                    let finished = WorkerMessage::Finished {
                        id: job.id,
                        outcome: outcome(job.command, result),
                    };
                    if tx.send(finished).is_err() {
                        break;
                    }
                }
                info!("Motion executor stopped");
            })?;

        Ok(Self {
            jobs,
            events,
            current: None,
            next_id: 0,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    pub fn running(&self) -> Option<&ManeuverCommand> {
        self.current.as_ref().map(|r| &r.command)
    }

    /// Start `command`, or reject it with `Busy` while another is in flight
    pub fn try_submit(&mut self, command: ManeuverCommand) -> Result<(), MotionError> {
        if self.is_busy() {
            return Err(MotionError::Busy);
        }

        self.next_id += 1;
        let cancel = CancelToken::new();
        let job = Job {
            id: self.next_id,
            command,
            cancel: cancel.clone(),
        };
        self.jobs.send(job).map_err(|_| MotionError::Unsupported {
            reason: "motion executor is not running".into(),
        })?;

        self.current = Some(Running {
            id: self.next_id,
            command,
            cancel,
            refreshed_at: Instant::now(),
        });
        Ok(())
    }

    /// Ask the in-flight job to stop. Its outcome still arrives as an event.
    pub fn cancel(&self) {
        if let Some(running) = &self.current {
            running.cancel.cancel();
        }
    }

    /// Keep-alive for the in-flight job
    pub fn refresh(&mut self) {
        if let Some(running) = self.current.as_mut() {
            running.refreshed_at = Instant::now();
        }
    }

    fn idle_for(&self) -> Option<Duration> {
        self.current.as_ref().map(|r| r.refreshed_at.elapsed())
    }

    fn try_message(&mut self) -> Option<Outgoing> {
        let msg = self.events.try_recv().ok()?;
        Some(match msg {
            WorkerMessage::Report(report) => Outgoing::Report(report),
            WorkerMessage::Finished { id, outcome } => {
                if self.current.as_ref().is_some_and(|r| r.id == id) {
                    self.current = None;
                }
                Outgoing::Outcome(outcome)
            }
        })
    }
}

/// Command handling and health, independent of the transport
pub struct Runtime {
    executor: Executor,
    pending: Option<ManeuverCommand>,
    teleop_timeout: Duration,
    faulted: bool,
    health: RuntimeHealth,
    outbox: Vec<Outgoing>,
}

impl Runtime {
    pub fn new(executor: Executor) -> Self {
        Self {
            executor,
            pending: None,
            teleop_timeout: CMD_TIMEOUT,
            faulted: false,
            health: RuntimeHealth::Idle,
            outbox: Vec::new(),
        }
    }

    pub fn with_teleop_timeout(mut self, timeout: Duration) -> Self {
        self.teleop_timeout = timeout;
        self
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: ManeuverCommand) {
        info!("Received command: {}", cmd);

        if cmd.is_stop() {
            self.pending = None;
            if self.executor.is_busy() {
                self.executor.cancel();
                self.outbox.push(Outgoing::Outcome(outcome(cmd, Ok(()))));
                return;
            }
        }

        if let Some(teleop) = cmd.teleop() {
            let running = self.executor.running().and_then(ManeuverCommand::teleop);
            if running == Some(teleop) {
                self.executor.refresh();
                return;
            }
            if running.is_some() {
                // Switch motions once the current drive has wound down
                self.executor.cancel();
                self.pending = Some(cmd);
                return;
            }
        }

        self.submit(cmd);
    }

    fn submit(&mut self, cmd: ManeuverCommand) {
        if let Err(e) = self.executor.try_submit(cmd) {
            warn!("Rejected {}: {}", cmd, e);
            self.outbox.push(Outgoing::Outcome(outcome(cmd, Err(e))));
        }
        self.update_health();
    }

    /// Drain executor events, run the teleop watchdog, refresh health
    pub fn poll(&mut self) {
        while let Some(msg) = self.executor.try_message() {
            if let Outgoing::Outcome(outcome) = &msg {
                self.faulted = outcome.status == OutcomeStatus::Failed;
            }
            self.outbox.push(msg);
        }

        if !self.executor.is_busy() {
            if let Some(cmd) = self.pending.take() {
                self.submit(cmd);
            }
        }

        let teleop_running = self.executor.running().and_then(ManeuverCommand::teleop).is_some();
        if teleop_running {
            if let Some(age) = self.executor.idle_for() {
                if age > self.teleop_timeout {
                    // Watchdog triggered - stop the robot
                    warn!("Teleop stale ({:?} old), stopping robot", age);
                    self.executor.cancel();
                }
            }
        }

        self.update_health();
    }

    fn update_health(&mut self) {
        self.health = if self.executor.is_busy() {
            RuntimeHealth::Busy
        } else if self.faulted {
            RuntimeHealth::Fault
        } else {
            RuntimeHealth::Idle
        };
    }

    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }
}

/// Build the simulated base and start the command loop
pub async fn run(options: RuntimeOptions) -> Result<(), BoxError> {
    info!(
        "Calibration: wheel {} cm, track {} cm, {} steps/rev, {} deg/tick",
        options.calibration.wheel.diameter_cm(),
        options.calibration.wheel.track_diameter_cm(),
        options.calibration.wheel.steps_per_rev(),
        options.calibration.degrees_per_tick
    );

    let encoders = Encoders::new();
    let drive = simulated_pair(&options.calibration, &encoders, SIM_STEP_DT);
    let ctl = MotionController::new(options.calibration.clone(), drive, encoders);

    let mut limits = RunLimits::default().with_poll_interval(SIM_STEP_DT);
    limits.timeout = options.run_timeout;
    let runtime = Runtime::new(Executor::spawn(ctl, limits)?);

    match options.source {
        CommandSource::Zenoh => run_zenoh(runtime).await,
        CommandSource::Serial { port, baudrate } => run_serial(runtime, &port, baudrate).await,
    }
}

async fn run_zenoh(mut runtime: Runtime) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MANEUVER).await?;
    let pub_diagnostics = session.declare_publisher(TOPIC_DIAGNOSTICS).await?;
    let pub_outcome = session.declare_publisher(TOPIC_OUTCOME).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    info!(
        "Runtime started: {}Hz loop, {}ms teleop watchdog",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_MANEUVER);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_DIAGNOSTICS, TOPIC_OUTCOME, TOPIC_HEALTH
    );

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking)
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ManeuverCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Executor events and watchdog
        runtime.poll();

        // 3. Publish diagnostics and outcomes
        for msg in runtime.take_outbox() {
            match msg {
                Outgoing::Report(report) => {
                    pub_diagnostics.put(serde_json::to_string(&report)?).await?;
                }
                Outgoing::Outcome(outcome) => {
                    pub_outcome.put(serde_json::to_string(&outcome)?).await?;
                }
            }
        }

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

async fn run_serial(mut runtime: Runtime, port: &str, baudrate: u32) -> Result<(), BoxError> {
    info!("Opening text link on {} at {} baud", port, baudrate);
    let mut reader = TextLink::open(port, baudrate)?;
    let mut writer = reader.try_clone()?;
    writer.send_line("diffbot ready")?;

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Result<ManeuverCommand, String>>();
    let link_task = tokio::task::spawn_blocking(move || -> Result<(), LinkError> {
        loop {
            let frame = match reader.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(LinkError::FrameTooLong { len }) => {
                    warn!("Dropped {} bytes without a terminator", len);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let parsed = frame.parse::<ManeuverCommand>().map_err(|e| e.to_string());
            if cmd_tx.send(parsed).is_err() {
                return Ok(());
            }
        }
    });

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    info!("Runtime started: {}Hz loop on text link", LOOP_HZ);

    loop {
        tick.tick().await;

        loop {
            match cmd_rx.try_recv() {
                Ok(Ok(cmd)) => runtime.on_command(cmd),
                Ok(Err(e)) => {
                    warn!("Failed to parse command: {}", e);
                    writer.send_line(&format!("error: {}", e))?;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    link_task.await??;
                    return Err(LinkError::Closed.into());
                }
            }
        }

        runtime.poll();

        for msg in runtime.take_outbox() {
            let line = match msg {
                Outgoing::Report(report) => serde_json::to_string(&report)?,
                Outgoing::Outcome(outcome) => serde_json::to_string(&outcome)?,
            };
            writer.send_line(&line)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::sim::SimulatedStepper;
    use crate::motion::{Direction, TeleopCommand};

    fn sim_runtime() -> Runtime {
        let cal = Calibration::default();
        let encoders = Encoders::new();
        let drive = simulated_pair(&cal, &encoders, SIM_STEP_DT);
        let ctl: MotionController<SimulatedStepper> = MotionController::new(cal, drive, encoders);
        let limits = RunLimits::default().with_poll_interval(SIM_STEP_DT);
        Runtime::new(Executor::spawn(ctl, limits).unwrap())
    }

    /// Poll until `n` outcomes have been published or two seconds pass
    async fn outcomes(runtime: &mut Runtime, n: usize) -> Vec<ManeuverOutcome> {
        let mut seen = Vec::new();
        for _ in 0..400 {
            runtime.poll();
            seen.extend(runtime.take_outbox().into_iter().filter_map(|m| match m {
                Outgoing::Outcome(o) => Some(o),
                Outgoing::Report(_) => None,
            }));
            if seen.len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        seen
    }

    #[tokio::test]
    async fn test_second_maneuver_rejected_while_busy() {
        let mut runtime = sim_runtime();
        let first = ManeuverCommand::Forward { distance_cm: 50.0 };
        let second = ManeuverCommand::Pivot {
            direction: Direction::Zero,
        };

        runtime.on_command(first);
        runtime.on_command(second);

        assert_eq!(runtime.health(), RuntimeHealth::Busy);
        let rejected = runtime.take_outbox();
        assert_eq!(rejected.len(), 1);
        match &rejected[0] {
            Outgoing::Outcome(o) => {
                assert_eq!(o.command, second);
                assert_eq!(o.status, OutcomeStatus::Rejected);
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        runtime.on_command(ManeuverCommand::Stop);
        let done = outcomes(&mut runtime, 2).await;
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].command, ManeuverCommand::Stop);
        assert_eq!(done[1].command, first);
        assert_eq!(done[1].status, OutcomeStatus::Cancelled);
        assert_eq!(runtime.health(), RuntimeHealth::Idle);
    }

    #[tokio::test]
    async fn test_invalid_geometry_reports_fault() {
        let mut runtime = sim_runtime();
        runtime.on_command(ManeuverCommand::Circle {
            diameter_cm: 5.0,
            direction: Direction::One,
        });

        let done = outcomes(&mut runtime, 1).await;
        assert_eq!(done[0].status, OutcomeStatus::Failed);
        assert!(done[0].error.as_deref().unwrap().contains("track diameter"));
        assert_eq!(runtime.health(), RuntimeHealth::Fault);
    }

    #[tokio::test]
    async fn test_teleop_watchdog_stops_drive() {
        let mut runtime = sim_runtime().with_teleop_timeout(Duration::from_millis(30));
        let drive = ManeuverCommand::Drive {
            teleop: TeleopCommand::Forward,
        };

        runtime.on_command(drive);
        // Keep-alive refreshes rather than rejecting
        runtime.on_command(drive);
        assert!(runtime.take_outbox().is_empty());

        let done = outcomes(&mut runtime, 1).await;
        assert_eq!(done[0].command, drive);
        assert_eq!(done[0].status, OutcomeStatus::Completed);
    }

    #[tokio::test]
    async fn test_teleop_switch_is_queued() {
        let mut runtime = sim_runtime().with_teleop_timeout(Duration::from_secs(10));
        let forward = ManeuverCommand::Drive {
            teleop: TeleopCommand::Forward,
        };
        let reverse = ManeuverCommand::Drive {
            teleop: TeleopCommand::Reverse,
        };

        runtime.on_command(forward);
        runtime.on_command(reverse);

        let first = outcomes(&mut runtime, 1).await;
        assert_eq!(first[0].command, forward);
        assert_eq!(runtime.health(), RuntimeHealth::Busy);

        runtime.on_command(ManeuverCommand::Stop);
        let rest = outcomes(&mut runtime, 2).await;
        assert_eq!(rest[0].command, ManeuverCommand::Stop);
        assert_eq!(rest[1].command, reverse);
    }

    #[test]
    fn test_outcome_mapping() {
        let cmd = ManeuverCommand::Stop;
        assert_eq!(outcome(cmd, Ok(())).status, OutcomeStatus::Completed);
        assert_eq!(
            outcome(cmd, Err(MotionError::Cancelled)).status,
            OutcomeStatus::Cancelled
        );
        let failed = outcome(cmd, Err(MotionError::CalibrationUnset { field: "x" }));
        assert_eq!(failed.status, OutcomeStatus::Failed);
        assert!(failed.error.is_some());
    }
}
