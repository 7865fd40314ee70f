//! Byte-level bus transaction primitives.
//!
//! Every wait on the controller is bounded by the tick counter so the engine
//! makes progress even if the hardware never raises the expected status bit.

use std::sync::Arc;

use smbusb_protocol::{BusError, BusResult};
use tracing::{trace, warn};

use crate::hal::{I2cController, TickCounter};

/// Acknowledgement returned by the target for one written byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledge {
    Ack,
    Nack,
}

impl Acknowledge {
    pub fn is_ack(self) -> bool {
        self == Acknowledge::Ack
    }
}

/// Whether a bus transaction is currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Open,
}

/// Framing of one byte read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadStep {
    /// Discard the controller's dummy cycle before the real data.
    pub first: bool,
    /// Single-byte read: arm the last-read signal before the dummy cycle.
    pub single: bool,
    /// Arm the last-read signal so the following byte is NACKed.
    pub second_to_last: bool,
    /// Finish with a stop condition instead of clocking another byte.
    pub last: bool,
}

impl ReadStep {
    /// Framing of byte `index` in a read of `total` bytes, all within one call.
    pub fn in_sequence(index: usize, total: usize) -> Self {
        Self {
            first: index == 0,
            single: total == 1,
            second_to_last: index.checked_add(2) == Some(total),
            last: index.checked_add(1) == Some(total),
        }
    }
}

/// Timing parameters for [`I2cBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusTiming {
    pub start_retries: u8,
    pub start_retry_delay_ms: u32,
    pub timeout_ticks: u32,
}

/// I2C master built on an [`I2cController`].
#[derive(Debug)]
pub struct I2cBus<C> {
    controller: C,
    ticks: Arc<TickCounter>,
    timing: BusTiming,
    session: SessionState,
}

impl<C: I2cController> I2cBus<C> {
    pub fn new(controller: C, ticks: Arc<TickCounter>, timing: BusTiming) -> Self {
        Self {
            controller,
            ticks,
            timing,
            session: SessionState::Idle,
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn ticks(&self) -> &Arc<TickCounter> {
        &self.ticks
    }

    /// Assert a start condition, retrying while the controller reports a bus error.
    ///
    /// # Errors
    ///
    /// [`BusError::BusBusyOrError`] once the retry budget is exhausted.
    pub fn start(&mut self) -> BusResult<()> {
        for attempt in 0..self.timing.start_retries {
            self.controller.issue_start();
            if !self.controller.bus_error() {
                trace!(attempt, "start");
                self.session = SessionState::Open;
                return Ok(());
            }
            self.controller.delay_ms(self.timing.start_retry_delay_ms);
        }
        warn!(retries = self.timing.start_retries, "start condition not asserted");
        Err(BusError::BusBusyOrError)
    }

    /// Repeated start without releasing the bus.
    pub fn restart(&mut self) {
        trace!("repeated start");
        self.controller.issue_start();
        self.session = SessionState::Open;
    }

    /// Assert a stop condition and wait for it to complete.
    ///
    /// Best effort: a stop that never completes is logged and abandoned.
    pub fn stop(&mut self) {
        self.controller.issue_stop();
        if self.wait_stop_complete().is_err() {
            warn!("stop condition did not complete");
        }
        trace!("stop");
        self.session = SessionState::Idle;
    }

    /// Clock out one byte.
    ///
    /// # Errors
    ///
    /// [`BusError::Timeout`] (after forcing a stop) if the transfer does not
    /// complete, [`BusError::BusBusyOrError`] if a bus error is latched.
    pub fn write_byte(&mut self, byte: u8) -> BusResult<Acknowledge> {
        self.controller.write_data(byte);
        self.wait_done_or_abort()?;
        if self.controller.bus_error() {
            warn!(byte = format_args!("{byte:#04x}"), "bus error latched during write");
            return Err(BusError::BusBusyOrError);
        }
        let ack = if self.controller.acked() {
            Acknowledge::Ack
        } else {
            Acknowledge::Nack
        };
        trace!(byte = format_args!("{byte:#04x}"), ?ack, "write");
        Ok(ack)
    }

    /// Clock out one byte that the target must acknowledge.
    ///
    /// # Errors
    ///
    /// As [`write_byte`](Self::write_byte), plus [`BusError::Nack`].
    pub fn write_acked(&mut self, byte: u8) -> BusResult<()> {
        match self.write_byte(byte)? {
            Acknowledge::Ack => Ok(()),
            Acknowledge::Nack => Err(BusError::Nack),
        }
    }

    /// Clock in one byte with the given framing.
    ///
    /// # Errors
    ///
    /// [`BusError::Timeout`] (after forcing a stop) if the controller does not
    /// complete the byte or the closing stop in time.
    pub fn read_byte(&mut self, step: ReadStep) -> BusResult<u8> {
        if step.single {
            self.controller.arm_last_read();
        }
        if step.first {
            let _dummy = self.controller.read_data();
            self.wait_done_or_abort()?;
        }
        if step.last {
            self.controller.issue_stop();
        }
        if step.second_to_last {
            self.controller.arm_last_read();
        }

        let byte = self.controller.read_data();

        if step.last {
            if self.wait_stop_complete().is_err() {
                self.stop();
                return Err(BusError::Timeout);
            }
            self.session = SessionState::Idle;
        } else {
            self.wait_done_or_abort()?;
        }
        trace!(byte = format_args!("{byte:#04x}"), ?step, "read");
        Ok(byte)
    }

    fn wait_done_or_abort(&mut self) -> BusResult<()> {
        let begin = self.ticks.now();
        while !self.controller.is_done() {
            if self.ticks.elapsed_since(begin) > self.timing.timeout_ticks {
                warn!("byte transfer timed out");
                self.stop();
                return Err(BusError::Timeout);
            }
            std::hint::spin_loop();
        }
        Ok(())
    }

    fn wait_stop_complete(&mut self) -> BusResult<()> {
        let begin = self.ticks.now();
        while self.controller.stop_pending() {
            if self.ticks.elapsed_since(begin) > self.timing.timeout_ticks {
                return Err(BusError::Timeout);
            }
            std::hint::spin_loop();
        }
        Ok(())
    }
}
