//! 24Cxx-class serial EEPROM on the TWI bus (one word address byte).
//!
//! After STOP of a write the device is busy programming its cells for a
//! few milliseconds and NAKs every address phase until done; writes
//! poll for that ("acknowledge polling") before returning.
//!
//! A page write may carry up to a page of data; the device's address
//! counter wraps around within the page, so callers must not cross a
//! page boundary in a single `write_page` (`write` splits for you).

use crate::twi::{
	BusError,
	BusRegisters,
	BusStatus,
	Deadline,
	Direction,
	I2cMaster,
	Phase,
	SlaveAddress,
	WaitLimit,
};

/// 0b1010_0000: device type identifier, chip select bits zero
pub const EEPROM_CONTROL_BYTE: u8 = 0xa0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EepromConfig {
	pub address: SlaveAddress,
	pub page_size: usize,
	pub capacity: usize,
	/// bound for the acknowledge polling after each write
	pub write_cycle: WaitLimit,
}

impl Default for EepromConfig {
	fn default() -> Self {
		EepromConfig {
			address: SlaveAddress::from_control_byte(EEPROM_CONTROL_BYTE),
			page_size: 8,
			capacity: 0x100,
			write_cycle: WaitLimit::Polls(1000),
		}
	}
}

impl EepromConfig {
	pub fn check(&self) -> crate::AResult<()> {
		ensure!(self.capacity > 0 && self.capacity <= 0x100,
			"EEPROM capacity {} not addressable with one address byte", self.capacity
		);
		ensure!(self.page_size.is_power_of_two() && self.page_size <= self.capacity,
			"Invalid EEPROM page size {}", self.page_size
		);
		Ok(())
	}
}

fn require_ack(status: BusStatus, phase: Phase) -> Result<(), BusError> {
	if status.is_ack() {
		Ok(())
	} else {
		Err(BusError::Nak { phase, status })
	}
}

// SLA+W and the word address
fn point_at<R: BusRegisters>(master: &mut I2cMaster<R>, device: SlaveAddress, address: u8) -> Result<(), BusError> {
	let phase = Phase::Address(Direction::Write);
	require_ack(master.transmit_address(device, Direction::Write)?, phase)?;
	require_ack(master.transmit_byte(address)?, Phase::Transmit)
}

pub struct Eeprom<R: BusRegisters> {
	master: I2cMaster<R>,
	config: EepromConfig,
}

impl<R: BusRegisters> Eeprom<R> {
	/// `master` must already be initialized
	pub fn new(master: I2cMaster<R>, config: EepromConfig) -> crate::AResult<Self> {
		config.check()?;
		Ok(Eeprom { master, config })
	}

	pub fn master(&self) -> &I2cMaster<R> {
		&self.master
	}

	pub fn into_master(self) -> I2cMaster<R> {
		self.master
	}

	pub fn config(&self) -> &EepromConfig {
		&self.config
	}

	fn check_range(&self, start: u8, len: usize) -> crate::AResult<()> {
		ensure!(usize::from(start) + len <= self.config.capacity,
			"Range 0x{:02x}+{} outside of EEPROM (capacity {})", start, len, self.config.capacity
		);
		Ok(())
	}

	/// Random read: always sets the address pointer first
	pub fn read_byte(&mut self, address: u8) -> crate::AResult<u8> {
		self.check_range(address, 1)?;
		let device = self.config.address;

		let mut tx = self.master.transaction()?;
		point_at(&mut *tx, device, address)?;
		tx.start()?;
		require_ack(tx.transmit_address(device, Direction::Read)?, Phase::Address(Direction::Read))?;
		let data = tx.receive_byte(false)?;
		tx.finish()?;

		trace!("EEPROM {}: read 0x{:02x} @ 0x{:02x}", device, data, address);
		Ok(data)
	}

	pub fn write_byte(&mut self, address: u8, data: u8) -> crate::AResult<()> {
		self.check_range(address, 1)?;
		let device = self.config.address;

		let mut tx = self.master.transaction()?;
		point_at(&mut *tx, device, address)?;
		require_ack(tx.transmit_byte(data)?, Phase::Transmit)?;
		tx.finish()?;

		trace!("EEPROM {}: wrote 0x{:02x} @ 0x{:02x}", device, data, address);
		self.wait_until_write_complete()?;
		Ok(())
	}

	/// Probe with START + SLA+W until the device acknowledges again.
	///
	/// Returns the number of probes (including the successful one).
	pub fn wait_until_write_complete(&mut self) -> crate::AResult<u32> {
		let device = self.config.address;
		let mut deadline = Deadline::new(self.config.write_cycle);

		let mut tx = self.master.transaction()?;
		loop {
			let status = tx.transmit_address(device, Direction::Write)?;
			if status == BusStatus::WriteAddressAck {
				tx.finish()?;
				let probes = deadline.polls() + 1;
				debug!("EEPROM {}: write cycle complete after {} probe(s)", device, probes);
				return Ok(probes);
			}
			if deadline.expired() {
				return Err(BusError::Timeout { phase: Phase::WriteCycle }.into());
			}
			tx.start()?;
		}
	}

	/// Write up to one page in a single transaction.
	///
	/// Bytes past the end of the page wrap to its beginning (device rule).
	pub fn write_page(&mut self, start: u8, data: &[u8]) -> crate::AResult<()> {
		if data.is_empty() {
			return Ok(());
		}
		ensure!(data.len() <= self.config.page_size,
			"Page write of {} bytes exceeds page size {}", data.len(), self.config.page_size
		);
		self.check_range(start, 1)?;
		let device = self.config.address;

		let mut tx = self.master.transaction()?;
		point_at(&mut *tx, device, start)?;
		for b in data {
			require_ack(tx.transmit_byte(*b)?, Phase::Transmit)?;
		}
		tx.finish()?;

		debug!("EEPROM {}: page write of {} bytes @ 0x{:02x}", device, data.len(), start);
		self.wait_until_write_complete()?;
		Ok(())
	}

	pub fn sequential_read(&mut self, start: u8, count: usize) -> crate::AResult<Vec<u8>> {
		ensure!(count > 0, "Sequential read of zero bytes");
		let mut buf = vec![0u8; count];
		self.read(start, &mut buf)?;
		Ok(buf)
	}

	/// Fill `target` starting at `start`; the device wraps at the end of
	/// memory, but never more than once
	pub fn read(&mut self, start: u8, target: &mut [u8]) -> crate::AResult<()> {
		ensure!(!target.is_empty(), "Sequential read of zero bytes");
		ensure!(target.len() <= self.config.capacity,
			"Sequential read of {} bytes exceeds EEPROM capacity {}", target.len(), self.config.capacity
		);
		self.check_range(start, 1)?;
		let device = self.config.address;

		let mut tx = self.master.transaction()?;
		point_at(&mut *tx, device, start)?;
		tx.start()?;
		require_ack(tx.transmit_address(device, Direction::Read)?, Phase::Address(Direction::Read))?;
		let last = target.len() - 1;
		for (i, t) in target.iter_mut().enumerate() {
			// ACK all but the last byte
			*t = tx.receive_byte(i != last)?;
		}
		tx.finish()?;

		debug!("EEPROM {}: read {} bytes @ 0x{:02x}", device, target.len(), start);
		Ok(())
	}

	/// Write any run of bytes, split at page boundaries
	pub fn write(&mut self, start: u8, data: &[u8]) -> crate::AResult<()> {
		self.check_range(start, data.len())?;
		let page_size = self.config.page_size;

		let mut address = usize::from(start);
		let mut rest = data;
		while !rest.is_empty() {
			let room = page_size - address % page_size;
			let (chunk, tail) = rest.split_at(room.min(rest.len()));
			with_context!(("Page write @ 0x{:02x}", address), {
				self.write_page(address as u8, chunk)
			})?;
			address += chunk.len();
			rest = tail;
		}
		Ok(())
	}

	pub fn dump(&mut self) -> crate::AResult<Vec<u8>> {
		let capacity = self.config.capacity;
		self.sequential_read(0, capacity)
	}

	pub fn verify(&mut self, start: u8, expected: &[u8]) -> crate::AResult<()> {
		if expected.is_empty() {
			return Ok(());
		}
		self.check_range(start, expected.len())?;
		let actual = self.sequential_read(start, expected.len())?;
		for (i, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
			ensure!(e == a,
				"Verify failed at {:02x}: expected {:02x}, EEPROM has {:02x}", usize::from(start) + i, e, a
			);
		}
		Ok(())
	}
}
