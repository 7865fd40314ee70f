//! Hardware boundary of the bus engine.
//!
//! [`I2cController`] mirrors a register-level I2C master: a start/stop
//! control register, a data register whose reads clock the next byte in,
//! and status bits for completion, acknowledgement and bus error.
//!
//! [`TickCounter`] and [`CommandSignal`] are the only state shared with
//! interrupt context. Each has exactly one producer (the timer interrupt and
//! the setup-packet interrupt respectively) and the main loop as its only
//! consumer, so plain atomics suffice.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Register-level I2C master controller.
///
/// The data register is pipelined: after the address byte with the read bit
/// has been sent, each call to [`read_data`](Self::read_data) returns the byte
/// latched by the previous clocking and starts clocking the next one. The
/// very first read after addressing therefore returns a dummy value.
///
/// Implementations must honour the read-ahead constraint: the "last read"
/// signal has to be armed before the read that starts clocking the byte it
/// applies to, so that byte is NACKed.
pub trait I2cController {
    /// Request a start (or repeated start) condition.
    fn issue_start(&mut self);

    /// Request a stop condition after the current byte.
    fn issue_stop(&mut self);

    /// True while a requested stop condition has not completed.
    fn stop_pending(&mut self) -> bool;

    /// Load a byte into the data register and clock it out.
    fn write_data(&mut self, byte: u8);

    /// Read the data register, clocking in the next byte unless a stop was requested.
    fn read_data(&mut self) -> u8;

    /// True once the current byte transfer has completed.
    fn is_done(&mut self) -> bool;

    /// Acknowledge bit of the last byte written.
    fn acked(&self) -> bool;

    /// Bus error latched by the last start or transfer.
    fn bus_error(&self) -> bool;

    /// NACK the next byte clocked in.
    fn arm_last_read(&mut self);

    /// Busy-wait for roughly `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

/// Free-running tick counter advanced by a periodic timer interrupt.
///
/// Not a wall clock. Wraps silently; elapsed time is always computed with
/// wrapping subtraction.
#[derive(Debug, Default)]
pub struct TickCounter {
    ticks: AtomicU32,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
        }
    }

    /// Timer interrupt entry point.
    #[inline]
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Release);
    }

    pub fn advance(&self, ticks: u32) {
        self.ticks.fetch_add(ticks, Ordering::Release);
    }

    #[inline]
    pub fn now(&self) -> u32 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Ticks elapsed since `since`.
    #[inline]
    pub fn elapsed_since(&self, since: u32) -> u32 {
        self.now().wrapping_sub(since)
    }
}

/// "New command pending" flag raised by the setup-packet interrupt.
#[derive(Debug, Default)]
pub struct CommandSignal {
    pending: AtomicBool,
}

impl CommandSignal {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Interrupt entry point.
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Consume the pending flag. Returns whether it was set.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counter_wraps() {
        let ticks = TickCounter::new();
        ticks.advance(u32::MAX);
        let before = ticks.now();
        ticks.tick();
        ticks.tick();
        assert_eq!(ticks.now(), 1);
        assert_eq!(ticks.elapsed_since(before), 2);
    }

    #[test]
    fn test_signal_take_consumes() {
        let signal = CommandSignal::new();
        assert!(!signal.take());
        signal.raise();
        assert!(signal.is_pending());
        assert!(signal.take());
        assert!(!signal.take());
    }

    #[test]
    fn test_signal_across_threads() {
        let signal = std::sync::Arc::new(CommandSignal::new());
        let producer = std::sync::Arc::clone(&signal);
        let handle = std::thread::spawn(move || producer.raise());
        assert!(handle.join().is_ok());
        assert!(signal.take());
    }
}
