//! Serial trigger input. Reads are zero-timeout and guarded by `bytes_to_read`, so a
//! poll never blocks the loop.

use crate::input::SymbolSource;
use mvast_core::TaskError;
use std::io::Read;
use std::time::Duration;

pub struct SerialSource {
    path: String,
    port: Box<dyn serialport::SerialPort>,
}

impl SerialSource {
    pub fn open(path: impl Into<String>, baud_rate: u32) -> Result<Self, TaskError> {
        let path = path.into();
        let port = serialport::new(&path, baud_rate)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| TaskError::channel(format!("serial port {path}"), e))?;
        log::info!("Serial port {} opened at {} baud", path, baud_rate);
        Ok(Self { path, port })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SymbolSource for SerialSource {
    fn read_pending_symbol(&mut self) -> Result<Option<char>, TaskError> {
        let pending = self
            .port
            .bytes_to_read()
            .map_err(|e| TaskError::channel(format!("serial port {}", self.path), e))?;
        if pending == 0 {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0] as char)),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(TaskError::channel(format!("serial port {}", self.path), e)),
        }
    }
}

impl std::fmt::Debug for SerialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSource").field("path", &self.path).finish()
    }
}
