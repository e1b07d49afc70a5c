//! In-process TWI peripheral with a single slave device attached.
//!
//! The register behaviour follows the AVR TWI block:
//! - writing the control register with the interrupt flag set clears the
//!   flag and launches the next phase; the flag is set again on completion
//! - the phase is chosen from the START/STOP bits or, without them, from
//!   the current status code (address after START, data after ACKed
//!   address/data)
//! - STOP doesn't set the interrupt flag; the STOP bit clears itself and
//!   the status goes back to 0xf8 ("no information")
//! - only the prescaler bits of the status register are writable
//!
//! Completion can be delayed by a number of `relax()` calls to exercise
//! the busy-waits, and the bus can be stalled, made to lose arbitration
//! or run into a bus error (status 0x00).
//!
//! Events are only recorded with `with_event_log()`; they are always
//! counted.

use crate::twi::{
	BusRegisters,
	Direction,
	Register,
	SlaveAddress,
};
use crate::twi::clock::{
	BitRate,
	Prescaler,
};
use crate::twi::registers::{
	CONTROL_ACK_ENABLE,
	CONTROL_ENABLE,
	CONTROL_INTERRUPT,
	CONTROL_START,
	CONTROL_STOP,
	STATUS_CODE_MASK,
	STATUS_PRESCALER_MASK,
};

mod eeprom;

pub use self::eeprom::SimEeprom;

const STATUS_IDLE: u8 = 0xf8;
const STATUS_BUS_ERROR: u8 = 0x00;
const STATUS_START: u8 = 0x08;
const STATUS_REPEATED_START: u8 = 0x10;
const STATUS_SLAW_ACK: u8 = 0x18;
const STATUS_SLAW_NACK: u8 = 0x20;
const STATUS_DATA_SENT_ACK: u8 = 0x28;
const STATUS_DATA_SENT_NACK: u8 = 0x30;
const STATUS_ARBITRATION_LOST: u8 = 0x38;
const STATUS_SLAR_ACK: u8 = 0x40;
const STATUS_SLAR_NACK: u8 = 0x48;
const STATUS_DATA_RECEIVED_ACK: u8 = 0x50;
const STATUS_DATA_RECEIVED_NACK: u8 = 0x58;

/// A slave on the simulated bus
pub trait BusDevice {
	fn address(&self) -> SlaveAddress;

	/// START or repeated START seen on the bus
	fn start(&mut self);

	/// addressed with SLA+R/W; returns ACK
	fn select(&mut self, direction: Direction) -> bool;

	/// data byte from the master; returns ACK
	fn write(&mut self, data: u8) -> bool;

	/// byte for the master; `ack` is what the master answers
	fn read(&mut self, ack: bool) -> u8;

	fn stop(&mut self);
}

/// What happened on the wires, in order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BusEvent {
	Start { repeated: bool },
	Address(u8),
	Write(u8),
	Read { data: u8, ack: bool },
	Stop,
	ArbitrationLost,
	BusError,
}

#[derive(Clone, Copy, Debug)]
struct Completion {
	status: u8,
	remaining: u32,
}

pub struct SimulatedBus<D: BusDevice> {
	bit_rate: u8,
	status: u8,
	data: u8,
	control: u8,
	interrupt: bool,
	/// START was sent and no STOP yet
	owned: bool,
	pending: Option<Completion>,
	latency: u32,
	stalled: bool,
	lose_arbitration_at: Option<usize>,
	bus_error_at: Option<usize>,
	device: D,
	event_count: usize,
	events: Option<Vec<BusEvent>>,
}

impl<D: BusDevice> SimulatedBus<D> {
	pub fn new(device: D) -> Self {
		SimulatedBus {
			bit_rate: 0,
			status: STATUS_IDLE,
			data: 0xff,
			control: 0,
			interrupt: false,
			owned: false,
			pending: None,
			latency: 0,
			stalled: false,
			lose_arbitration_at: None,
			bus_error_at: None,
			device,
			event_count: 0,
			events: None,
		}
	}

	/// Delay each completion by `polls` calls to `relax()`
	pub fn with_latency(mut self, polls: u32) -> Self {
		self.latency = polls;
		self
	}

	pub fn with_event_log(mut self) -> Self {
		self.events = Some(Vec::new());
		self
	}

	/// A stalled bus never completes a phase
	pub fn set_stalled(&mut self, stalled: bool) {
		self.stalled = stalled;
	}

	/// Lose arbitration in the phase that would record event number `event`
	pub fn lose_arbitration_at(&mut self, event: usize) {
		self.lose_arbitration_at = Some(event);
	}

	/// Bus error (status 0x00) in the phase that would record event number `event`
	pub fn bus_error_at(&mut self, event: usize) {
		self.bus_error_at = Some(event);
	}

	/// Recorded events; empty without `with_event_log()`
	pub fn events(&self) -> &[BusEvent] {
		match self.events {
			Some(ref events) => &events[..],
			None => &[],
		}
	}

	/// Number of events seen, recorded or not
	pub fn event_count(&self) -> usize {
		self.event_count
	}

	pub fn device(&self) -> &D {
		&self.device
	}

	pub fn into_device(self) -> D {
		self.device
	}

	pub fn is_enabled(&self) -> bool {
		0 != self.control & CONTROL_ENABLE
	}

	pub fn scl_frequency(&self, source_hz: u32) -> u32 {
		let rate = BitRate {
			divider: self.bit_rate,
			prescaler: Prescaler::from_bits(self.status),
		};
		rate.scl_frequency(source_hz)
	}

	fn write_control(&mut self, value: u8) {
		let launch = 0 != value & CONTROL_INTERRUPT;
		self.control = value & !CONTROL_INTERRUPT;
		if !launch {
			return;
		}
		self.interrupt = false;
		if !self.is_enabled() {
			return;
		}

		if 0 != value & CONTROL_START {
			if self.arbitration_lost() || self.bus_error() {
				return;
			}
			self.record(BusEvent::Start { repeated: self.owned });
			self.device.start();
			let status = if self.owned { STATUS_REPEATED_START } else { STATUS_START };
			self.owned = true;
			self.complete(status);
		} else if 0 != value & CONTROL_STOP {
			self.record(BusEvent::Stop);
			if self.owned {
				self.device.stop();
			}
			self.owned = false;
			self.complete(STATUS_IDLE);
		} else {
			self.data_phase(0 != value & CONTROL_ACK_ENABLE);
		}
	}

	fn data_phase(&mut self, ack_enable: bool) {
		match self.status & STATUS_CODE_MASK {
			STATUS_START | STATUS_REPEATED_START => {
				if self.arbitration_lost() || self.bus_error() {
					return;
				}
				let frame = self.data;
				self.record(BusEvent::Address(frame));
				let direction = if 0 != frame & 0x1 { Direction::Read } else { Direction::Write };
				let acked = (frame >> 1) == self.device.address().seven_bit()
					&& self.device.select(direction);
				let status = match (direction, acked) {
					(Direction::Write, true) => STATUS_SLAW_ACK,
					(Direction::Write, false) => STATUS_SLAW_NACK,
					(Direction::Read, true) => STATUS_SLAR_ACK,
					(Direction::Read, false) => STATUS_SLAR_NACK,
				};
				self.complete(status);
			},
			STATUS_SLAW_ACK | STATUS_DATA_SENT_ACK => {
				if self.arbitration_lost() || self.bus_error() {
					return;
				}
				let data = self.data;
				self.record(BusEvent::Write(data));
				let acked = self.device.write(data);
				self.complete(if acked { STATUS_DATA_SENT_ACK } else { STATUS_DATA_SENT_NACK });
			},
			STATUS_SLAR_ACK | STATUS_DATA_RECEIVED_ACK => {
				if self.arbitration_lost() || self.bus_error() {
					return;
				}
				let data = self.device.read(ack_enable);
				self.data = data;
				self.record(BusEvent::Read { data, ack: ack_enable });
				self.complete(if ack_enable { STATUS_DATA_RECEIVED_ACK } else { STATUS_DATA_RECEIVED_NACK });
			},
			_ => {
				// nothing valid to do in this state
				self.complete(STATUS_BUS_ERROR);
			},
		}
	}

	fn record(&mut self, event: BusEvent) {
		self.event_count += 1;
		if let Some(ref mut events) = self.events {
			events.push(event);
		}
	}

	fn arbitration_lost(&mut self) -> bool {
		if self.lose_arbitration_at != Some(self.event_count) {
			return false;
		}
		self.lose_arbitration_at = None;
		self.record(BusEvent::ArbitrationLost);
		if self.owned {
			self.device.stop();
		}
		self.owned = false;
		self.complete(STATUS_ARBITRATION_LOST);
		true
	}

	// the peripheral keeps the bus until STOP is requested
	fn bus_error(&mut self) -> bool {
		if self.bus_error_at != Some(self.event_count) {
			return false;
		}
		self.bus_error_at = None;
		self.record(BusEvent::BusError);
		self.complete(STATUS_BUS_ERROR);
		true
	}

	fn complete(&mut self, status: u8) {
		if self.stalled {
			return;
		}
		let completion = Completion {
			status,
			remaining: self.latency,
		};
		if 0 == completion.remaining {
			self.apply(completion);
		} else {
			self.pending = Some(completion);
		}
	}

	fn apply(&mut self, completion: Completion) {
		self.status = (self.status & STATUS_PRESCALER_MASK) | completion.status;
		if 0 != self.control & CONTROL_STOP {
			self.control &= !CONTROL_STOP;
		} else {
			self.interrupt = true;
		}
	}
}

impl<D: BusDevice> BusRegisters for SimulatedBus<D> {
	fn read(&self, register: Register) -> u8 {
		match register {
			Register::BitRate => self.bit_rate,
			Register::Status => self.status,
			Register::Data => self.data,
			Register::Control => {
				if self.interrupt {
					self.control | CONTROL_INTERRUPT
				} else {
					self.control
				}
			},
		}
	}

	fn write(&mut self, register: Register, value: u8) {
		match register {
			Register::BitRate => self.bit_rate = value,
			Register::Status => {
				self.status = (self.status & STATUS_CODE_MASK) | (value & STATUS_PRESCALER_MASK);
			},
			Register::Data => self.data = value,
			Register::Control => self.write_control(value),
		}
	}

	fn relax(&mut self) {
		if let Some(mut completion) = self.pending.take() {
			completion.remaining -= 1;
			if 0 == completion.remaining {
				self.apply(completion);
			} else {
				self.pending = Some(completion);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::twi::registers::ControlWrite;

	fn bus() -> SimulatedBus<SimEeprom> {
		let mut bus = SimulatedBus::new(SimEeprom::new(SlaveAddress::new(0x50), 256, 8)).with_event_log();
		bus.write(Register::Control, ControlWrite::enable().0);
		bus
	}

	#[test]
	fn start_sets_interrupt_flag() {
		let mut bus = bus();
		assert_eq!(bus.read(Register::Status), STATUS_IDLE);
		bus.write(Register::Control, ControlWrite::start().0);
		assert_eq!(bus.read(Register::Control) & CONTROL_INTERRUPT, CONTROL_INTERRUPT);
		assert_eq!(bus.read(Register::Status), STATUS_START);
	}

	#[test]
	fn stop_clears_its_bit_without_interrupt() {
		let mut bus = bus();
		bus.write(Register::Control, ControlWrite::start().0);
		bus.write(Register::Control, ControlWrite::stop().0);
		assert_eq!(bus.read(Register::Control) & (CONTROL_STOP | CONTROL_INTERRUPT), 0);
		assert_eq!(bus.read(Register::Status), STATUS_IDLE);
		assert_eq!(bus.events(), &[BusEvent::Start { repeated: false }, BusEvent::Stop][..]);
	}

	#[test]
	fn latency_delays_completion() {
		let mut bus = bus().with_latency(3);
		bus.write(Register::Control, ControlWrite::start().0);
		assert_eq!(bus.read(Register::Control) & CONTROL_INTERRUPT, 0);
		bus.relax();
		bus.relax();
		assert_eq!(bus.read(Register::Control) & CONTROL_INTERRUPT, 0);
		bus.relax();
		assert_eq!(bus.read(Register::Control) & CONTROL_INTERRUPT, CONTROL_INTERRUPT);
	}

	#[test]
	fn status_code_is_read_only() {
		let mut bus = bus();
		bus.write(Register::Status, 0xff);
		assert_eq!(bus.read(Register::Status), STATUS_IDLE | 0x03);
	}

	#[test]
	fn wrong_address_is_not_acknowledged() {
		let mut bus = bus();
		bus.write(Register::Control, ControlWrite::start().0);
		bus.write(Register::Data, 0x42);
		bus.write(Register::Control, ControlWrite::proceed().0);
		assert_eq!(bus.read(Register::Status), STATUS_SLAW_NACK);
	}

	#[test]
	fn disabled_peripheral_does_nothing() {
		let mut bus = SimulatedBus::new(SimEeprom::new(SlaveAddress::new(0x50), 256, 8)).with_event_log();
		bus.write(Register::Control, ControlWrite::start().0 & !CONTROL_ENABLE);
		assert_eq!(bus.read(Register::Control) & CONTROL_INTERRUPT, 0);
		assert!(bus.events().is_empty());
	}

	#[test]
	fn events_are_counted_but_not_kept_by_default() {
		let mut bus = SimulatedBus::new(SimEeprom::new(SlaveAddress::new(0x50), 256, 8));
		bus.write(Register::Control, ControlWrite::enable().0);
		for _ in 0..1000 {
			bus.write(Register::Control, ControlWrite::start().0);
			bus.write(Register::Control, ControlWrite::stop().0);
		}
		assert_eq!(bus.event_count(), 2000);
		assert!(bus.events().is_empty());
	}

	#[test]
	fn injected_faults_count_unlogged_events() {
		let mut bus = SimulatedBus::new(SimEeprom::new(SlaveAddress::new(0x50), 256, 8));
		bus.write(Register::Control, ControlWrite::enable().0);
		bus.bus_error_at(1);
		bus.write(Register::Control, ControlWrite::start().0);
		bus.write(Register::Data, 0xa0);
		bus.write(Register::Control, ControlWrite::proceed().0);
		assert_eq!(bus.read(Register::Status), STATUS_BUS_ERROR);
		assert_eq!(bus.event_count(), 2);
	}

	#[test]
	fn bus_error_is_cleared_by_stop() {
		let mut bus = bus();
		bus.bus_error_at(0);
		bus.write(Register::Control, ControlWrite::start().0);
		assert_eq!(bus.read(Register::Control) & CONTROL_INTERRUPT, CONTROL_INTERRUPT);
		assert_eq!(bus.read(Register::Status), STATUS_BUS_ERROR);
		bus.write(Register::Control, ControlWrite::stop().0);
		assert_eq!(bus.read(Register::Status), STATUS_IDLE);
		assert_eq!(bus.events(), &[BusEvent::BusError, BusEvent::Stop][..]);
	}
}
