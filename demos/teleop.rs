// Keyboard teleop: W/S drive, A/D spin, Q/E turn, SPACE stop, X quit
//
// Usage: cargo run --example teleop
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use diffbot_motion::config::TOPIC_CMD_MANEUVER;
use diffbot_motion::messages::ManeuverCommand;
use diffbot_motion::motion::{Direction, TeleopCommand};

const INPUT_TIMEOUT_MS: u64 = 100; // Send stop after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MANEUVER).await?;

    info!("Controls: W/S=drive, A/D=spin, Q/E=turn, SPACE=stop, X=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn publish(
    publisher: &zenoh::pubsub::Publisher<'_>,
    cmd: ManeuverCommand,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(&cmd)?).await?;
    Ok(())
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut motion: Option<TeleopCommand> = None;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                let next = match code {
                    KeyCode::Char('w') if pressed => Some(TeleopCommand::Forward),
                    KeyCode::Char('s') if pressed => Some(TeleopCommand::Reverse),
                    KeyCode::Char('a') if pressed => Some(TeleopCommand::Spin(Direction::One)),
                    KeyCode::Char('d') if pressed => Some(TeleopCommand::Spin(Direction::Zero)),
                    KeyCode::Char('q') if pressed => Some(TeleopCommand::Turn(Direction::Zero)),
                    KeyCode::Char('e') if pressed => Some(TeleopCommand::Turn(Direction::One)),

                    KeyCode::Char(' ') if pressed => {
                        motion = None;
                        publish(publisher, ManeuverCommand::Stop).await?;
                        None
                    }

                    // Quit
                    KeyCode::Char('x') | KeyCode::Esc if pressed => break,

                    _ => None,
                };

                if next.is_some() {
                    motion = next;
                    last_movement_input = Instant::now();
                }
            }
        }

        // Stop if no movement input for INPUT_TIMEOUT_MS
        if motion.is_some()
            && last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS)
        {
            motion = None;
            publish(publisher, ManeuverCommand::Stop).await?;
        }

        // Keep-alive at ~50Hz while a key is held
        if let Some(teleop) = motion {
            publish(publisher, ManeuverCommand::Drive { teleop }).await?;
        }
    }

    publish(publisher, ManeuverCommand::Stop).await?;
    Ok(())
}
