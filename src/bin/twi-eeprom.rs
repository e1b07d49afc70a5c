#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate twi_eeprom;
use twi_eeprom::*;

use failure::ResultExt;
use std::convert::TryFrom;
use std::fs;
use std::io::{
	self,
	Write,
};
use std::path::Path;
use std::process::exit;
use std::thread;
use std::time::Duration;

use twi_eeprom::eeprom::{
	EEPROM_CONTROL_BYTE,
	Eeprom,
	EepromConfig,
};
use twi_eeprom::sim::{
	SimEeprom,
	SimulatedBus,
};
use twi_eeprom::twi::{
	BusRegisters,
	BusStatus,
	I2cMaster,
	MasterConfig,
	SlaveAddress,
	WaitLimit,
};

/// decimal or 0x-prefixed hexadecimal
struct Number(u64);

impl std::str::FromStr for Number {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.starts_with("0x") || s.starts_with("0X") {
			Ok(Number(u64::from_str_radix(&s[2..], 16)?))
		} else {
			Ok(Number(s.parse()?))
		}
	}
}

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn parse_number<T: TryFrom<u64>>(name: &str, value: &str) -> AResult<T> {
	let Number(n) = value.parse::<Number>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		failure::Error::from(e.context(msg))
	})?;
	T::try_from(n).map_err(|_| format_err!("parameter {} out of range: {}", name, n))
}

fn get_number<T: TryFrom<u64>>(matches: &clap::ArgMatches, name: &str) -> AResult<T> {
	let Number(n) = get_param(matches, name)?;
	T::try_from(n).map_err(|_| format_err!("parameter {} out of range: {}", name, n))
}

fn get_number_or<T: TryFrom<u64>>(matches: &clap::ArgMatches, name: &str, default: T) -> AResult<T> {
	if matches.is_present(name) {
		get_number(matches, name)
	} else {
		Ok(default)
	}
}

// 0 means unbounded
fn poll_limit(polls: u32) -> WaitLimit {
	if 0 == polls {
		WaitLimit::Forever
	} else {
		WaitLimit::Polls(polls)
	}
}

fn print_hex(start: usize, data: &[u8]) {
	for (i, b) in data.iter().enumerate() {
		if 0 == i % 16 {
			if 0 != i {
				println!();
			}
			print!("{:02x}:", start + i);
		} else if 0 == i % 8 {
			print!(" ");
		}
		print!(" {:02x}", b);
	}
	println!();
}

fn read<R: BusRegisters>(ee: &mut Eeprom<R>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address: u8 = get_number(sub_m, "ADDR")?;
	if sub_m.is_present("COUNT") {
		let count: usize = get_number(sub_m, "COUNT")?;
		let data = ee.sequential_read(address, count)?;
		print_hex(usize::from(address), &data);
	} else {
		println!("@{:02x}: {:02x}", address, ee.read_byte(address)?);
	}
	Ok(())
}

fn write_verified<R: BusRegisters>(ee: &mut Eeprom<R>, address: u8, data: &[u8]) -> AResult<()> {
	ee.write(address, data)?;
	ee.verify(address, data)?;
	info!("Wrote {} bytes @ 0x{:02x}", data.len(), address);
	Ok(())
}

fn write<R: BusRegisters>(ee: &mut Eeprom<R>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address: u8 = get_number(sub_m, "ADDR")?;
	let data = match sub_m.values_of("BYTES") {
		Some(values) => values.map(|v| parse_number::<u8>("BYTES", v)).collect::<AResult<Vec<u8>>>()?,
		None => bail!("missing parameter BYTES"),
	};
	write_verified(ee, address, &data)
}

fn write_str<R: BusRegisters>(ee: &mut Eeprom<R>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address: u8 = get_number(sub_m, "ADDR")?;
	let text = match sub_m.value_of("TEXT") {
		Some(t) => t,
		None => bail!("missing parameter TEXT"),
	};
	write_verified(ee, address, text.as_bytes())
}

fn dump<R: BusRegisters>(ee: &mut Eeprom<R>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let image = ee.dump()?;
	if sub_m.is_present("raw") {
		io::stdout().write_all(&image)?;
	} else {
		print_hex(0, &image);
	}
	Ok(())
}

fn demo<R: BusRegisters>(ee: &mut Eeprom<R>, sub_m: &clap::ArgMatches) -> AResult<()> {
	const START: u8 = 0x10;
	const TEXT: &[u8] = b"Olle";

	// 0 rounds: forever
	let rounds: u32 = get_number_or(sub_m, "rounds", 1)?;
	let delay = Duration::from_millis(get_number_or(sub_m, "delay", 1000)?);

	for (i, b) in TEXT.iter().enumerate() {
		ee.write_byte(START + i as u8, *b)?;
	}
	println!("Status: {}", ee.master().status());

	let mut round = 0;
	while 0 == rounds || round < rounds {
		if 0 != round {
			thread::sleep(delay);
		}
		let mut line = String::new();
		for i in 0..TEXT.len() {
			line.push(char::from(ee.read_byte(START + i as u8)?));
		}
		println!("{}", line);
		round += 1;
	}
	Ok(())
}

fn decode(sub_m: &clap::ArgMatches) -> AResult<()> {
	let raw: u8 = get_number(sub_m, "STATUS")?;
	let status = BusStatus::from_register(raw);
	println!("0x{:02x}: {}", status.code(), status);
	Ok(())
}

fn run<R: BusRegisters>(registers: R, matches: &clap::ArgMatches) -> AResult<R> {
	let master_config = MasterConfig {
		source_clock_hz: get_number_or(matches, "clock", 16_000_000)?,
		wait: poll_limit(get_number_or(matches, "timeout", 0xffff)?),
	};
	let speed: u32 = get_number_or(matches, "speed", 100_000)?;
	let config = eeprom_config(matches)?;

	let mut master = I2cMaster::new(registers, master_config);
	master.initialize(speed);
	let mut ee = Eeprom::new(master, config)?;

	match matches.subcommand() {
		("read", Some(sub_m)) => read(&mut ee, sub_m)?,
		("write", Some(sub_m)) => write(&mut ee, sub_m)?,
		("write_str", Some(sub_m)) => write_str(&mut ee, sub_m)?,
		("dump", Some(sub_m)) => dump(&mut ee, sub_m)?,
		("demo", Some(sub_m)) => demo(&mut ee, sub_m)?,
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}

	Ok(ee.into_master().into_registers())
}

fn eeprom_config(matches: &clap::ArgMatches) -> AResult<EepromConfig> {
	let config = EepromConfig {
		address: SlaveAddress::from_control_byte(get_number_or(matches, "address", EEPROM_CONTROL_BYTE)?),
		page_size: get_number_or(matches, "page", 8)?,
		capacity: get_number_or(matches, "capacity", 0x100)?,
		write_cycle: poll_limit(get_number_or(matches, "polls", 1000)?),
	};
	config.check()?;
	Ok(config)
}

fn run_simulated(matches: &clap::ArgMatches) -> AResult<()> {
	let config = eeprom_config(matches)?;
	let image = matches.value_of("image").map(Path::new);

	// a real device needs a few probes after each write
	let mut device = SimEeprom::new(config.address, config.capacity, config.page_size).with_write_cycle(5);
	if let Some(path) = image {
		if path.exists() {
			let data = fs::read(path).with_context(|e| {
				format!("Couldn't read EEPROM image {}: {}", path.display(), e)
			})?;
			if data.len() != config.capacity {
				warn!("EEPROM image {} has {} bytes, capacity is {}", path.display(), data.len(), config.capacity);
			}
			device.load(&data);
		}
	}

	let bus = run(SimulatedBus::new(device), matches)?;
	debug!("Simulated bus: {} events", bus.event_count());

	if let Some(path) = image {
		let device = bus.into_device();
		fs::write(path, device.memory()).with_context(|e| {
			format!("Couldn't write EEPROM image {}: {}", path.display(), e)
		})?;
	}
	Ok(())
}

fn run_mapped(path: &str, matches: &clap::ArgMatches) -> AResult<()> {
	let base: usize = get_number_or(matches, "base", 0)?;
	let registers = twi::mapped::open_registers(path, base).with_context(|e| {
		format!("Couldn't map TWI registers at 0x{:x} of {}: {}", base, path, e)
	})?;
	run(registers, matches)?;
	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg sim: --sim "use the simulated bus (default)")
		(@arg image: --image +takes_value "simulated EEPROM content, loaded and saved back")
		(@arg map: --map +takes_value "device file to map the TWI registers from (e.g. /dev/mem)")
		(@arg base: --base +takes_value "offset of the bit rate register within the mapped file")
		(@arg clock: --clock +takes_value "peripheral source clock in Hz (16000000)")
		(@arg speed: --speed +takes_value "SCL frequency in Hz (100000)")
		(@arg timeout: --timeout +takes_value "polls per bus phase before giving up (65535, 0 = never)")
		(@arg address: --address +takes_value "EEPROM control byte (0xa0)")
		(@arg page: --page +takes_value "EEPROM page size (8)")
		(@arg capacity: --capacity +takes_value "EEPROM size in bytes (256)")
		(@arg polls: --polls +takes_value "write cycle probes before giving up (1000, 0 = never)")
		(@subcommand read =>
			(about: "read a byte, or COUNT bytes sequentially")
			(@arg ADDR: +required "EEPROM address")
			(@arg COUNT: "number of bytes")
		)
		(@subcommand write =>
			(about: "write bytes and verify")
			(@arg ADDR: +required "EEPROM address")
			(@arg BYTES: +required +multiple "bytes to write")
		)
		(@subcommand write_str =>
			(about: "write text and verify")
			(@arg ADDR: +required "EEPROM address")
			(@arg TEXT: +required "text to write")
		)
		(@subcommand dump =>
			(about: "dump the whole EEPROM")
			(@arg raw: --raw "binary output to stdout")
		)
		(@subcommand demo =>
			(about: "write \"Olle\" at 0x10 and read it back")
			(@arg rounds: --rounds +takes_value "read back rounds (1, 0 = forever)")
			(@arg delay: --delay +takes_value "milliseconds between rounds (1000)")
		)
		(@subcommand decode =>
			(about: "describe a TWI status register value")
			(@arg STATUS: +required "status register value")
		)
	).get_matches();

	if let ("decode", Some(sub_m)) = matches.subcommand() {
		return decode(sub_m);
	}

	match matches.value_of("map") {
		Some(path) => {
			if matches.is_present("sim") {
				bail!("--sim and --map are exclusive");
			}
			run_mapped(path, &matches)
		},
		None => run_simulated(&matches),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
