use crate::twi::{
	Direction,
	SlaveAddress,
};

use super::BusDevice;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
	Idle,
	// SLA+W received, next byte is the word address
	WordAddress,
	Writing,
	Reading,
}

/// 24Cxx-class serial EEPROM with one word address byte.
///
/// - writes are buffered and committed on STOP; data bytes wrap around
///   within the page of the start address
/// - after a commit the device NAKs the next `write_cycle` address phases
/// - reads continue at the address pointer and wrap at the end of memory
/// - a START in the middle of a write aborts it
pub struct SimEeprom {
	address: SlaveAddress,
	memory: Vec<u8>,
	page_size: usize,
	pointer: usize,
	mode: Mode,
	pending: Vec<(usize, u8)>,
	write_cycle: u32,
	busy: u32,
	commits: usize,
}

impl SimEeprom {
	/// `page_size` must be a power of two; memory starts erased (0xff)
	pub fn new(address: SlaveAddress, capacity: usize, page_size: usize) -> Self {
		assert!(capacity > 0 && capacity <= 0x100);
		assert!(page_size.is_power_of_two() && page_size <= capacity);
		SimEeprom {
			address,
			memory: vec![0xff; capacity],
			page_size,
			pointer: 0,
			mode: Mode::Idle,
			pending: Vec::new(),
			write_cycle: 0,
			busy: 0,
			commits: 0,
		}
	}

	/// Number of address phases NAKed after each commit
	pub fn with_write_cycle(mut self, probes: u32) -> Self {
		self.write_cycle = probes;
		self
	}

	pub fn load(&mut self, image: &[u8]) {
		let len = image.len().min(self.memory.len());
		self.memory[..len].copy_from_slice(&image[..len]);
	}

	pub fn memory(&self) -> &[u8] {
		&self.memory
	}

	/// Number of completed write cycles
	pub fn commits(&self) -> usize {
		self.commits
	}

	pub fn is_busy(&self) -> bool {
		self.busy > 0
	}

	fn next_in_page(&self, address: usize) -> usize {
		let page = address & !(self.page_size - 1);
		page | ((address + 1) & (self.page_size - 1))
	}
}

impl BusDevice for SimEeprom {
	fn address(&self) -> SlaveAddress {
		self.address
	}

	fn start(&mut self) {
		if !self.pending.is_empty() {
			debug!("sim eeprom: write of {} bytes aborted by START", self.pending.len());
			self.pending.clear();
		}
		self.mode = Mode::Idle;
	}

	fn select(&mut self, direction: Direction) -> bool {
		if self.busy > 0 {
			self.busy -= 1;
			return false;
		}
		self.mode = match direction {
			Direction::Write => Mode::WordAddress,
			Direction::Read => Mode::Reading,
		};
		true
	}

	fn write(&mut self, data: u8) -> bool {
		match self.mode {
			Mode::WordAddress => {
				self.pointer = usize::from(data) % self.memory.len();
				self.mode = Mode::Writing;
				true
			},
			Mode::Writing => {
				self.pending.push((self.pointer, data));
				self.pointer = self.next_in_page(self.pointer);
				true
			},
			Mode::Idle | Mode::Reading => false,
		}
	}

	fn read(&mut self, _ack: bool) -> u8 {
		let data = self.memory[self.pointer];
		self.pointer = (self.pointer + 1) % self.memory.len();
		data
	}

	fn stop(&mut self) {
		if self.mode == Mode::Writing && !self.pending.is_empty() {
			for &(address, data) in &self.pending {
				self.memory[address] = data;
			}
			trace!("sim eeprom: committed {} bytes", self.pending.len());
			self.pending.clear();
			self.busy = self.write_cycle;
			self.commits += 1;
		}
		self.mode = Mode::Idle;
	}
}
