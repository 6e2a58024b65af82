//! SIGINT/SIGTERM as a pollable descriptor, so termination goes through the
//! same loop (and the same shutdown path) as every other event

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::low_level::pipe;
use std::io::Read;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::raw::c_int;
use std::os::unix::net::UnixStream;
use tracing::debug;

pub struct ShutdownSignals {
    receiver: UnixStream,
}

impl ShutdownSignals {
    pub fn register() -> Result<Self> {
        Self::for_signals(&[SIGINT, SIGTERM])
    }

    fn for_signals(signals: &[c_int]) -> Result<Self> {
        let (receiver, sender) = UnixStream::pair().context("Failed to create signal pipe")?;
        receiver
            .set_nonblocking(true)
            .context("Failed to make signal pipe non-blocking")?;
        for &signal in signals {
            let sender = sender.try_clone().context("Failed to clone signal pipe")?;
            pipe::register(signal, sender).context(format!("Failed to register handler for signal {}", signal))?;
        }
        debug!(signals = ?signals, "Registered shutdown signals");
        Ok(Self { receiver })
    }

    /// Drain wakeups; true if at least one signal arrived since the last call
    pub fn take_pending(&mut self) -> bool {
        let mut buf = [0u8; 16];
        let mut received = false;
        loop {
            match self.receiver.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => received = true,
            }
        }
        received
    }
}

impl AsFd for ShutdownSignals {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.receiver.as_fd()
    }
}
