//! Lock-free connection state shared with the worker
//!
//! Status and generation are packed into one `AtomicU64` (generation in the
//! high bits, status in the low byte), so a status change can be made
//! conditional on the generation in a single compare-exchange. A worker that
//! outlived its connection can therefore never overwrite a newer one.

use crate::types::ConnectionStatus;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// How a worker has been asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopMode {
    Run = 0,
    /// Finish the in-flight receive/process cycle, then exit
    Drain = 1,
    /// Exit at the next opportunity, discarding any in-flight message
    Abort = 2,
}

impl StopMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => StopMode::Run,
            1 => StopMode::Drain,
            _ => StopMode::Abort,
        }
    }
}

fn pack(generation: u64, status: ConnectionStatus) -> u64 {
    (generation << 8) | status.as_u8() as u64
}

fn unpack(value: u64) -> (u64, ConnectionStatus) {
    (value >> 8, ConnectionStatus::from_u8((value & 0xff) as u8))
}

#[derive(Debug)]
pub(crate) struct ConnectionState {
    packed: AtomicU64,
    enabled: AtomicBool,
}

impl ConnectionState {
    pub fn new(enabled: bool) -> Self {
        Self {
            packed: AtomicU64::new(pack(0, ConnectionStatus::Disconnected)),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        unpack(self.packed.load(Ordering::SeqCst)).1
    }

    pub fn generation(&self) -> u64 {
        unpack(self.packed.load(Ordering::SeqCst)).0
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Start a new generation in `Connecting`; returns its number
    pub fn begin(&self) -> u64 {
        let mut current = self.packed.load(Ordering::SeqCst);
        loop {
            let generation = unpack(current).0 + 1;
            match self.packed.compare_exchange(
                current,
                pack(generation, ConnectionStatus::Connecting),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return generation,
                Err(actual) => current = actual,
            }
        }
    }

    /// Move `generation` to `to`.
    ///
    /// Fails if another generation is current, if the status is not one of
    /// `from` (when given), or if the status is already `to`.
    pub fn transition(
        &self,
        generation: u64,
        from: Option<&[ConnectionStatus]>,
        to: ConnectionStatus,
    ) -> bool {
        let mut current = self.packed.load(Ordering::SeqCst);
        loop {
            let (gen, status) = unpack(current);
            if gen != generation || status == to {
                return false;
            }
            if let Some(from) = from {
                if !from.contains(&status) {
                    return false;
                }
            }
            match self.packed.compare_exchange(
                current,
                pack(generation, to),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Align Connected/Paused with the enabled flag; returns the new status
    /// if it changed
    pub fn sync_enabled(&self, generation: u64) -> Option<ConnectionStatus> {
        let (from, to) = if self.is_enabled() {
            (ConnectionStatus::Paused, ConnectionStatus::Connected)
        } else {
            (ConnectionStatus::Connected, ConnectionStatus::Paused)
        };
        self.transition(generation, Some(&[from]), to).then_some(to)
    }
}
