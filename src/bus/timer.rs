// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]
//! Gameboy's timer controller.

use super::Memory;
use super::memory_range::*;

use crate::GameboyError;

use crate::config::*;
use crate::cpu::interrupts::*;

pub mod consts {
	use super::*;

	pub const IO_DIV: u16 = 0xFF04;
	pub const IO_TIMA: u16 = 0xFF05;
	pub const IO_TMA: u16 = 0xFF06;
	pub const IO_TAC: u16 = 0xFF07;

	pub const MMAP_IO_TIMER: MemoryRange = make_range!(0xFF04, 0xFF07);
}

use consts::*;

pub struct Timer {
	/// DIV consists of 2 bytes, and only the higher 8 bits are exposed to the cpu.
	div: u16,
	/// Timer counter.
	tima: u8,
	/// Timer modulo.
	tma: u8,
	/// Timer control.
	tac: Tac,

	/// Set when TIMA overflowed this M-cycle; the reload happens one
	/// M-cycle later, unless a write to TIMA cancels it first.
	pending_reload: bool,

	interrupt_flag: InterruptMask,
}

struct Tac {
	pub enable: bool,
	pub frequency: u8,
}

impl Timer {
	/// Initialize a new timer instance.
	pub fn new(config: &Config) -> Self {
		let mut timer = Timer {
			div: 0,
			tima: 0,
			tma: 0,
			tac: Tac::new(),
			pending_reload: false,
			interrupt_flag: 0,
		};

		timer.reset(config);

		timer
	}

	/// Reset the peripheral to boot state.
	pub fn reset(&mut self, config: &Config) {
		match config.model {
			HardwareModel::GB | HardwareModel::SGB => {
				self.div = 0xabcc;
			}
			HardwareModel::GBC => {
				self.div = 0x1ea0;
			}
			HardwareModel::GBP => {
				self.div = 0x1ea4;
			}
		}

		self.tima = 0;
		self.tma = 0;
		self.tac.reset();
		self.pending_reload = false;
	}

	/// Update the timer's state according to the elapsed time, one T-cycle
	/// at a time so every falling edge of the selected DIV bit is observed
	/// even when several edges occur within the same call.
	pub fn process(&mut self, cycles: usize) {
		for _ in 0..cycles {
			self.tick();
		}
	}

	fn tick(&mut self) {
		// A reload scheduled on the previous tick lands now, unless a write
		// to TIMA in between cancelled it.
		if self.pending_reload {
			self.pending_reload = false;
			self.tima = self.tma;
			self.interrupt_flag |= Interrupt::Timer.value();
		}

		let div_bit = [512_u16, 8, 32, 128][self.tac.frequency as usize];
		let new_div = self.div.wrapping_add(1);

		let falling_edge = self.tac.enable
			&& (self.div & div_bit) != 0
			&& (new_div & div_bit) == 0;

		self.div = new_div;

		if falling_edge {
			let (result, overflowed) = self.tima.overflowing_add(1);
			self.tima = result;

			if overflowed {
				self.pending_reload = true;
			}
		}
	}
}

impl Memory for Timer {
	fn write(&mut self, address: u16, value: u8) -> Result<(), GameboyError> {
		match address {
			IO_DIV => {
				self.div = 0;
			}
			IO_TIMA => {
				// A write during the pending-reload window cancels the
				// reload (and the interrupt it would have requested).
				self.pending_reload = false;
				self.tima = value;
			}
			IO_TMA => {
				self.tma = value;
			}
			IO_TAC => {
				self.tac.write(value);
			}
			_ => return Err(GameboyError::BadAddress(address)),
		}

		Ok(())
	}

	fn read(&self, address: u16) -> Result<u8, GameboyError> {
		match address {
			IO_DIV => Ok(((self.div & 0xFF00) >> 8) as u8),
			IO_TIMA => Ok(self.tima),
			IO_TMA => Ok(self.tma),
			IO_TAC => Ok(self.tac.read()),
			_ => Err(GameboyError::BadAddress(address)),
		}
	}
}

impl InterruptSource for Timer {
	fn interrupts(&self) -> InterruptMask {
		self.interrupt_flag
	}

	fn clear(&mut self) {
		self.interrupt_flag = 0;
	}
}

#[allow(unused)]
impl Tac {
	pub fn new() -> Self {
		Tac { enable: false, frequency: 0 }
	}

	pub fn reset(&mut self) {
		self.enable = false;
		self.frequency = 0;
	}

	pub fn write(&mut self, value: u8) {
		self.enable = (value & 4) != 0;
		self.frequency = value & 3;
	}

	pub fn read(&self) -> u8 {
		self.frequency + if self.enable { 4 } else { 0 }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn timer_at(frequency: u8) -> Timer {
		let config = Config::default();
		let mut timer = Timer::new(&config);
		timer.div = 0;
		timer.write(IO_TAC, 4 | frequency).unwrap();
		timer
	}

	#[test]
	fn test_tima_increments_on_falling_edge_only() {
		// frequency 01 -> bit 3 (mask 8): falls every 16 T-cycles.
		let mut timer = timer_at(1);
		timer.process(15);
		assert_eq!(timer.tima, 0);
		timer.process(1);
		assert_eq!(timer.tima, 1);
	}

	#[test]
	fn test_overflow_reload_is_delayed_one_m_cycle() {
		let mut timer = timer_at(1);
		timer.tima = 0xFF;
		timer.tma = 0x42;

		// Drive one falling edge: TIMA overflows to 0 but TMA hasn't landed yet.
		timer.process(16);
		assert_eq!(timer.tima, 0);
		assert_eq!(timer.interrupts(), 0);

		// One more T-cycle (within the same M-cycle) lands the reload.
		timer.process(4);
		assert_eq!(timer.tima, 0x42);
		assert_eq!(timer.interrupts(), Interrupt::Timer.value());
	}

	#[test]
	fn test_tima_write_during_pending_window_cancels_reload() {
		let mut timer = timer_at(1);
		timer.tima = 0xFF;
		timer.tma = 0x42;

		timer.process(16);
		assert_eq!(timer.tima, 0);

		timer.write(IO_TIMA, 0x10).unwrap();
		timer.process(4);

		assert_eq!(timer.tima, 0x10);
		assert_eq!(timer.interrupts(), 0);
	}
}
