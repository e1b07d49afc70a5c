use std::fmt;
use std::ops::{
	Deref,
	DerefMut,
};

use super::address::{
	Direction,
	SlaveAddress,
};
use super::clock::BitRate;
use super::error::BusError;
use super::registers::{
	BusRegisters,
	ControlRead,
	ControlWrite,
	Register,
};
use super::status::BusStatus;
use super::wait::{
	WaitLimit,
	wait_until,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
	Start,
	Address(Direction),
	Transmit,
	Receive { ack: bool },
	Stop,
	/// write-cycle completion poll of a non-volatile device
	WriteCycle,
}

impl Phase {
	// status codes that complete this phase as intended (ACK or NAK)
	fn expects(self, status: BusStatus) -> bool {
		match (self, status) {
			(Phase::Start, BusStatus::Start) => true,
			(Phase::Start, BusStatus::RepeatedStart) => true,
			(Phase::Address(Direction::Write), BusStatus::WriteAddressAck) => true,
			(Phase::Address(Direction::Write), BusStatus::WriteAddressNak) => true,
			(Phase::Address(Direction::Read), BusStatus::ReadAddressAck) => true,
			(Phase::Address(Direction::Read), BusStatus::ReadAddressNak) => true,
			(Phase::Transmit, BusStatus::WriteDataAck) => true,
			(Phase::Transmit, BusStatus::WriteDataNak) => true,
			(Phase::Receive { ack: true }, BusStatus::ReadDataAck) => true,
			(Phase::Receive { ack: false }, BusStatus::ReadDataNak) => true,
			_ => false,
		}
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Phase::Start => f.write_str("START"),
			Phase::Address(direction) => write!(f, "SLA+{}", direction),
			Phase::Transmit => f.write_str("data transmit"),
			Phase::Receive { ack: true } => f.write_str("data receive (ACK)"),
			Phase::Receive { ack: false } => f.write_str("data receive (NAK)"),
			Phase::Stop => f.write_str("STOP"),
			Phase::WriteCycle => f.write_str("write cycle completion"),
		}
	}
}

/// Where the current transaction stands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BusState {
	Idle,
	Started,
	AddressSent { direction: Direction, acked: bool },
	/// for reads `acked` is the ACK the master sent after the byte
	DataPhase { direction: Direction, acked: bool },
	/// a phase timed out or ended with an unexpected status; only STOP
	/// (or a new START) gets the peripheral back
	Fault,
}

impl BusState {
	pub fn permits(self, phase: Phase) -> bool {
		match (self, phase) {
			(_, Phase::Start) => true,
			(_, Phase::Stop) => true,
			(BusState::Started, Phase::Address(_)) => true,
			(BusState::AddressSent { direction: Direction::Write, acked: true }, Phase::Transmit) => true,
			(BusState::DataPhase { direction: Direction::Write, acked: true }, Phase::Transmit) => true,
			(BusState::AddressSent { direction: Direction::Read, acked: true }, Phase::Receive { .. }) => true,
			(BusState::DataPhase { direction: Direction::Read, acked: true }, Phase::Receive { .. }) => true,
			_ => false,
		}
	}

	/// State after `phase` completed with `status`
	pub fn after(self, phase: Phase, status: BusStatus) -> BusState {
		match phase {
			Phase::Start => BusState::Started,
			Phase::Address(direction) => BusState::AddressSent { direction, acked: status.is_ack() },
			Phase::Transmit => BusState::DataPhase { direction: Direction::Write, acked: status.is_ack() },
			Phase::Receive { ack } => BusState::DataPhase { direction: Direction::Read, acked: ack },
			Phase::Stop | Phase::WriteCycle => BusState::Idle,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MasterConfig {
	pub source_clock_hz: u32,
	/// bound for each hardware phase
	pub wait: WaitLimit,
}

impl Default for MasterConfig {
	fn default() -> Self {
		MasterConfig {
			source_clock_hz: 16_000_000,
			wait: WaitLimit::Polls(0xffff),
		}
	}
}

pub struct I2cMaster<R: BusRegisters> {
	registers: R,
	config: MasterConfig,
	state: BusState,
	initialized: bool,
}

impl<R: BusRegisters> I2cMaster<R> {
	pub fn new(registers: R, config: MasterConfig) -> Self {
		I2cMaster {
			registers,
			config,
			state: BusState::Idle,
			initialized: false,
		}
	}

	pub fn registers(&self) -> &R {
		&self.registers
	}

	pub fn into_registers(self) -> R {
		self.registers
	}

	pub fn config(&self) -> &MasterConfig {
		&self.config
	}

	pub fn state(&self) -> BusState {
		self.state
	}

	/// Program the bit rate for `target_hz` and enable the peripheral.
	///
	/// Targets the divider can't express are clamped (with a warning).
	pub fn initialize(&mut self, target_hz: u32) {
		if self.initialized {
			warn!("TWI already initialized, reconfiguring");
		}
		let source_hz = self.config.source_clock_hz;
		let rate = match BitRate::for_frequency(source_hz, target_hz) {
			Some(rate) => rate,
			None => {
				let rate = BitRate::clamped(source_hz, target_hz);
				warn!(
					"TWI: can't generate {} Hz from a {} Hz clock, using {} Hz",
					target_hz, source_hz, rate.scl_frequency(source_hz)
				);
				rate
			}
		};
		debug!(
			"TWI: divider 0x{:02x}, prescaler {} -> {} Hz",
			rate.divider, rate.prescaler.factor(), rate.scl_frequency(source_hz)
		);

		self.registers.write(Register::BitRate, rate.divider);
		// only the prescaler bits are writable
		self.registers.write(Register::Status, rate.prescaler.bits());
		self.registers.write(Register::Control, ControlWrite::enable().0);

		self.state = BusState::Idle;
		self.initialized = true;
	}

	pub fn status(&self) -> BusStatus {
		BusStatus::from_register(self.registers.read(Register::Status))
	}

	/// START, or repeated START if a transaction is already open
	pub fn start(&mut self) -> Result<BusStatus, BusError> {
		self.check(Phase::Start)?;
		self.run_phase(Phase::Start, ControlWrite::start())
	}

	/// Always leaves the state machine `Idle`, even on timeout
	pub fn stop(&mut self) -> Result<(), BusError> {
		self.check(Phase::Stop)?;
		trace!("TWI {}: control {:?}", Phase::Stop, ControlWrite::stop());
		self.registers.write(Register::Control, ControlWrite::stop().0);
		self.state = BusState::Idle;

		let released = wait_until(&mut self.registers, self.config.wait, |r| {
			!ControlRead(r.read(Register::Control)).is_stop()
		});
		if !released {
			return Err(BusError::Timeout { phase: Phase::Stop });
		}
		Ok(())
	}

	/// Returns the SLA+R/W ACK or NAK status; a NAK is not an error here
	pub fn transmit_address(&mut self, address: SlaveAddress, direction: Direction) -> Result<BusStatus, BusError> {
		let phase = Phase::Address(direction);
		self.check(phase)?;
		self.registers.write(Register::Data, address.frame(direction));
		self.run_phase(phase, ControlWrite::proceed())
	}

	/// Returns the data ACK or NAK status
	pub fn transmit_byte(&mut self, data: u8) -> Result<BusStatus, BusError> {
		self.check(Phase::Transmit)?;
		self.registers.write(Register::Data, data);
		self.run_phase(Phase::Transmit, ControlWrite::proceed())
	}

	/// Receive one byte; ACK it if more bytes are wanted, NAK the last one
	pub fn receive_byte(&mut self, ack_following: bool) -> Result<u8, BusError> {
		let phase = Phase::Receive { ack: ack_following };
		self.check(phase)?;
		self.run_phase(phase, ControlWrite::receive(ack_following))?;
		Ok(self.registers.read(Register::Data))
	}

	/// START a transaction that is closed with STOP when the guard goes away
	pub fn transaction(&mut self) -> Result<Transaction<'_, R>, BusError> {
		let mut tx = Transaction { master: self };
		tx.start()?;
		Ok(tx)
	}

	fn check(&self, phase: Phase) -> Result<(), BusError> {
		if !self.initialized {
			return Err(BusError::NotInitialized);
		}
		if !self.state.permits(phase) {
			return Err(BusError::InvalidState { phase, state: self.state });
		}
		Ok(())
	}

	// launch a phase and wait for the interrupt flag
	fn run_phase(&mut self, phase: Phase, control: ControlWrite) -> Result<BusStatus, BusError> {
		trace!("TWI {}: control {:?}", phase, control);
		self.registers.write(Register::Control, control.0);

		let completed = wait_until(&mut self.registers, self.config.wait, |r| {
			ControlRead(r.read(Register::Control)).is_interrupt()
		});
		if !completed {
			self.state = BusState::Fault;
			return Err(BusError::Timeout { phase });
		}

		let status = self.status();
		trace!("TWI {}: status 0x{:02x} ({})", phase, status.code(), status);
		if phase.expects(status) {
			self.state = self.state.after(phase, status);
			Ok(status)
		} else if status == BusStatus::ArbitrationLostOrNak {
			// the peripheral dropped out of master mode
			self.state = BusState::Idle;
			Err(BusError::ArbitrationLost { phase })
		} else {
			self.state = BusState::Fault;
			Err(BusError::UnexpectedStatus { phase, status })
		}
	}
}

/// An open START..STOP span; derefs to the master
pub struct Transaction<'a, R: BusRegisters + 'a> {
	master: &'a mut I2cMaster<R>,
}

impl<'a, R: BusRegisters> Transaction<'a, R> {
	pub fn finish(self) -> Result<(), BusError> {
		self.master.stop()
	}
}

impl<'a, R: BusRegisters> Drop for Transaction<'a, R> {
	fn drop(&mut self) {
		if self.master.state != BusState::Idle {
			if let Err(e) = self.master.stop() {
				warn!("Couldn't release bus: {}", e);
			}
		}
	}
}

impl<'a, R: BusRegisters> Deref for Transaction<'a, R> {
	type Target = I2cMaster<R>;

	fn deref(&self) -> &Self::Target {
		&self.master
	}
}

impl<'a, R: BusRegisters> DerefMut for Transaction<'a, R> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.master
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sim::{
		BusEvent,
		SimEeprom,
		SimulatedBus,
	};

	const EEPROM: SlaveAddress = SlaveAddress::from_control_byte(0xa0);

	fn master() -> I2cMaster<SimulatedBus<SimEeprom>> {
		let bus = SimulatedBus::new(SimEeprom::new(EEPROM, 256, 8)).with_event_log();
		let mut master = I2cMaster::new(bus, MasterConfig::default());
		master.initialize(100_000);
		master
	}

	#[test]
	fn initialize_programs_bit_rate() {
		let master = master();
		assert!(master.registers().is_enabled());
		assert_eq!(master.registers().scl_frequency(16_000_000), 100_000);
	}

	#[test]
	fn primitives_require_initialize() {
		let bus = SimulatedBus::new(SimEeprom::new(EEPROM, 256, 8)).with_event_log();
		let mut master = I2cMaster::new(bus, MasterConfig::default());
		assert_eq!(master.start(), Err(BusError::NotInitialized));
		assert_eq!(master.stop(), Err(BusError::NotInitialized));
		assert!(master.registers().events().is_empty());
	}

	#[test]
	fn status_after_start_and_repeated_start() {
		let mut master = master();
		assert_eq!(master.start(), Ok(BusStatus::Start));
		assert_eq!(master.status(), BusStatus::Start);
		assert_eq!(master.transmit_address(EEPROM, Direction::Write), Ok(BusStatus::WriteAddressAck));
		assert_eq!(master.start(), Ok(BusStatus::RepeatedStart));
		assert_eq!(master.status(), BusStatus::RepeatedStart);
		master.stop().unwrap();
		assert_eq!(master.state(), BusState::Idle);
	}

	#[test]
	fn address_requires_start() {
		let mut master = master();
		assert_eq!(
			master.transmit_address(EEPROM, Direction::Write),
			Err(BusError::InvalidState { phase: Phase::Address(Direction::Write), state: BusState::Idle })
		);
		assert!(master.registers().events().is_empty());
	}

	#[test]
	fn data_requires_acknowledged_address() {
		let mut master = master();
		master.start().unwrap();
		let absent = SlaveAddress::new(0x21);
		assert_eq!(master.transmit_address(absent, Direction::Write), Ok(BusStatus::WriteAddressNak));
		assert_eq!(
			master.transmit_byte(0x00),
			Err(BusError::InvalidState {
				phase: Phase::Transmit,
				state: BusState::AddressSent { direction: Direction::Write, acked: false },
			})
		);
		master.stop().unwrap();
	}

	#[test]
	fn receive_requires_read_direction() {
		let mut master = master();
		master.start().unwrap();
		master.transmit_address(EEPROM, Direction::Write).unwrap();
		match master.receive_byte(false) {
			Err(BusError::InvalidState { phase: Phase::Receive { ack: false }, .. }) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		master.stop().unwrap();
	}

	#[test]
	fn no_receive_after_nak_terminated_byte() {
		let mut master = master();
		master.start().unwrap();
		master.transmit_address(EEPROM, Direction::Read).unwrap();
		master.receive_byte(false).unwrap();
		assert!(master.receive_byte(false).is_err());
		master.stop().unwrap();
	}

	#[test]
	fn waits_for_slow_hardware() {
		let bus = SimulatedBus::new(SimEeprom::new(EEPROM, 256, 8)).with_latency(25);
		let mut master = I2cMaster::new(bus, MasterConfig::default());
		master.initialize(100_000);
		assert_eq!(master.start(), Ok(BusStatus::Start));
		master.stop().unwrap();
	}

	#[test]
	fn stalled_bus_times_out() {
		let mut bus = SimulatedBus::new(SimEeprom::new(EEPROM, 256, 8));
		bus.set_stalled(true);
		let config = MasterConfig {
			wait: WaitLimit::Polls(50),
			..MasterConfig::default()
		};
		let mut master = I2cMaster::new(bus, config);
		master.initialize(100_000);
		assert_eq!(master.start(), Err(BusError::Timeout { phase: Phase::Start }));
		assert_eq!(master.stop(), Err(BusError::Timeout { phase: Phase::Stop }));
		assert_eq!(master.state(), BusState::Idle);
	}

	#[test]
	fn arbitration_loss_ends_transaction() {
		let mut bus = SimulatedBus::new(SimEeprom::new(EEPROM, 256, 8)).with_event_log();
		// START and SLA+W go through, the first data byte loses
		bus.lose_arbitration_at(2);
		let mut master = I2cMaster::new(bus, MasterConfig::default());
		master.initialize(100_000);
		{
			let mut tx = master.transaction().unwrap();
			tx.transmit_address(EEPROM, Direction::Write).unwrap();
			assert_eq!(tx.transmit_byte(0x10), Err(BusError::ArbitrationLost { phase: Phase::Transmit }));
			assert_eq!(tx.state(), BusState::Idle);
		}
		// no STOP from the dropped guard: the bus isn't ours anymore
		assert_eq!(master.registers().events().last(), Some(&BusEvent::ArbitrationLost));
	}

	#[test]
	fn bus_error_on_start_is_released_with_stop() {
		let mut master = master();
		master.registers.bus_error_at(0);
		match master.transaction() {
			Err(BusError::UnexpectedStatus { phase: Phase::Start, status: BusStatus::Unknown(0x00) }) => (),
			Err(e) => panic!("unexpected error: {:?}", e),
			Ok(_) => panic!("START should fail"),
		}
		assert_eq!(master.state(), BusState::Idle);
		assert_eq!(master.registers().events(), &[BusEvent::BusError, BusEvent::Stop][..]);
		assert_eq!(master.status(), BusStatus::Unknown(0xf8));
	}

	#[test]
	fn bus_error_in_data_phase_ends_transaction_with_stop() {
		let mut master = master();
		master.registers.bus_error_at(2);
		{
			let mut tx = master.transaction().unwrap();
			tx.transmit_address(EEPROM, Direction::Write).unwrap();
			assert_eq!(
				tx.transmit_byte(0x10),
				Err(BusError::UnexpectedStatus { phase: Phase::Transmit, status: BusStatus::Unknown(0x00) })
			);
			assert_eq!(tx.state(), BusState::Fault);
			// nothing but STOP/START after a fault
			assert!(tx.transmit_byte(0x11).is_err());
		}
		assert_eq!(master.state(), BusState::Idle);
		assert_eq!(master.registers().events().last(), Some(&BusEvent::Stop));
	}

	#[test]
	fn dropped_transaction_sends_stop() {
		let mut master = master();
		{
			let mut tx = master.transaction().unwrap();
			tx.transmit_address(EEPROM, Direction::Write).unwrap();
		}
		assert_eq!(master.state(), BusState::Idle);
		assert_eq!(master.registers().events(), &[
			BusEvent::Start { repeated: false },
			BusEvent::Address(0xa0),
			BusEvent::Stop,
		][..]);
	}

	#[test]
	fn finished_transaction_sends_single_stop() {
		let mut master = master();
		let mut tx = master.transaction().unwrap();
		tx.transmit_address(EEPROM, Direction::Write).unwrap();
		tx.finish().unwrap();
		let stops = master.registers().events().iter().filter(|e| **e == BusEvent::Stop).count();
		assert_eq!(stops, 1);
	}
}
