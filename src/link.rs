// Bidirectional text link (serial / Bluetooth bridge)
//
// Frames are `;`-terminated text commands. Every received frame is echoed
// back, telemetry goes out as newline-terminated lines.

use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::debug;

pub const FRAME_END: u8 = b';';
pub const MAX_FRAME_LEN: usize = 256;
const READ_TIMEOUT_MS: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Link closed by peer")]
    Closed,

    #[error("Frame exceeded {len} bytes without a terminator")]
    FrameTooLong { len: usize },
}

pub struct TextLink<T> {
    io: T,
    buf: Vec<u8>,
}

impl TextLink<Box<dyn SerialPort>> {
    /// Open the serial side of the link
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self, LinkError> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(READ_TIMEOUT_MS))
            .open()?;
        Ok(Self::new(port))
    }

    /// Second handle on the same port, for writing from another thread
    pub fn try_clone(&self) -> Result<Self, LinkError> {
        Ok(Self::new(self.io.try_clone()?))
    }
}

impl<T: Read + Write> TextLink<T> {
    pub fn new(io: T) -> Self {
        Self {
            io,
            buf: Vec::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Next complete frame, without its terminator. `Ok(None)` when the
    /// read timed out before a terminator arrived.
    pub fn read_frame(&mut self) -> Result<Option<String>, LinkError> {
        loop {
            if let Some(end) = self.buf.iter().position(|&b| b == FRAME_END) {
                let frame: Vec<u8> = self.buf.drain(..=end).collect();
                let text = String::from_utf8_lossy(&frame[..end]).trim().to_string();
                debug!("Link frame: {:?}", text);
                self.send_line(&format!("{};", text))?;
                return Ok(Some(text));
            }

            if self.buf.len() > MAX_FRAME_LEN {
                let len = self.buf.len();
                self.buf.clear();
                return Err(LinkError::FrameTooLong { len });
            }

            let mut chunk = [0u8; 64];
            match self.io.read(&mut chunk) {
                Ok(0) => return Err(LinkError::Closed),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        self.io.write_all(line.as_bytes())?;
        self.io.write_all(b"\r\n")?;
        self.io.flush()?;
        Ok(())
    }
}
