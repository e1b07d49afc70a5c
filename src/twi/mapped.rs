use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::io::{
	FromRawFd,
};
use std::ptr;

use libc::{
	MAP_SHARED,
	O_CLOEXEC,
	O_RDWR,
	O_SYNC,
	PROT_READ,
	PROT_WRITE,
	_SC_PAGESIZE,
	c_void,
	mmap,
	munmap,
	off_t,
	open,
	sysconf,
};

use super::registers::{
	BusRegisters,
	Register,
};

// bit rate .. control
const WINDOW_LEN: usize = 5;

/// TWI registers in a memory mapped window of a device file (`/dev/mem`,
/// a UIO node, ...).
#[derive(Debug)]
pub struct MappedRegisters {
	ptr: ptr::NonNull<u8>, // start of the mapping (page aligned)
	len: usize,
	base: usize, // offset of the bit rate register within the mapping
}

impl Drop for MappedRegisters {
	fn drop(&mut self) {
		unsafe {
			let res = munmap(
				self.ptr.as_ptr() as *mut c_void,
				self.len,
			);
			if 0 != res {
				panic!("munmap failed: {}", io::Error::last_os_error());
			}
		}
	}
}

impl MappedRegisters {
	fn location(&self, register: Register) -> *mut u8 {
		let offset = self.base + register.offset();
		assert!(offset < self.len);
		unsafe { self.ptr.as_ptr().add(offset) }
	}
}

impl BusRegisters for MappedRegisters {
	fn read(&self, register: Register) -> u8 {
		unsafe { ptr::read_volatile(self.location(register)) }
	}

	fn write(&mut self, register: Register, value: u8) {
		unsafe { ptr::write_volatile(self.location(register), value) }
	}

	fn relax(&mut self) {
		std::hint::spin_loop();
	}
}

/// Map the registers starting at byte `offset` of `path`.
// TODO: exclusive open / file locking?
pub fn open_registers(path: &str, offset: usize) -> io::Result<MappedRegisters> {
	let page_size = match unsafe { sysconf(_SC_PAGESIZE) } {
		size if size > 0 => size as usize,
		_ => return Err(io::Error::last_os_error()),
	};
	let map_start = offset & !(page_size - 1);
	let base = offset - map_start;
	let len = (base + WINDOW_LEN + page_size - 1) & !(page_size - 1);

	let path = CString::new(path)?;

	let fd = unsafe { open(path.as_ptr(), O_RDWR | O_CLOEXEC | O_SYNC) };
	if -1 == fd {
		return Err(io::Error::last_os_error());
	}
	// now get fd managed to prevent resource leak
	let _f = unsafe { fs::File::from_raw_fd(fd) };

	let area = unsafe {
		mmap(
			ptr::null_mut(),
			len,
			PROT_READ | PROT_WRITE,
			MAP_SHARED,
			fd,
			map_start as off_t,
		)
	};

	if area as usize == !0usize {
		return Err(io::Error::last_os_error());
	}
	match ptr::NonNull::new(area as *mut u8) {
		None => panic!("mmap shouldn't return NULL ever"),
		Some(area) => Ok(MappedRegisters {
			ptr: area,
			len,
			base,
		}),
	}
}
