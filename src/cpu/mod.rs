// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! Gameboy's processor emulation.

pub mod alu;
pub mod state;
pub mod decode;
pub mod interrupts;
pub mod instructions;

use num::PrimInt;
use core::mem::size_of;
use core::ops::{AddAssign, Shl};

use state::*;
use state::registers::*;
use instructions::{Instruction, enter_interrupt};

use crate::GameboyError;
use crate::config::Config;
use crate::bus::joypad::Controller;

use crate::bus::*;
use crate::bus::cartridge::*;
use crate::cpu::interrupts::*;

/// The gameboy's processor.
///
/// This struct contains the complete emulator's state.
pub struct Cpu<'a> {
	// Interrupts, system tick, cpu speed, serial ports and etc. should come here

	/// The cpu's registers.
	registers: CpuState<'a>,
	/// The devices' memory mapping
	pub mmap: SystemBus<'a>,
	/// The emulator's configuration
	pub config: &'a Config,

	/// Set by `HALT`, cleared once a pending interrupt wakes the cpu back up.
	pub halting: bool,
	/// `EI`'s effect is delayed by one instruction: 0 means no pending enable,
	/// 2 is set by `EI` itself, 1 means "enable at the top of this call", so
	/// that the instruction immediately following `EI` still runs with
	/// interrupts disabled and only the one after that can be interrupted.
	ime_delay: u8,
}

impl<'a> Cpu<'a> {
	/// Initializes a new virtual cpu
	#[inline(always)]
	pub fn new(config: &'a Config, cartridge: &'a mut Cartridge<'a>) -> Self {
		Cpu {
			registers: CpuState::new(config),
			mmap: SystemBus::new(&config, cartridge),
			config,
			halting: false,
			ime_delay: 0,
		}
	}

	/// Halt the cpu until the next interrupt (pending or newly raised).
	pub fn halt(&mut self) {
		self.halting = true;
	}

	/// Arm `EI`'s one-instruction-delayed interrupt enable.
	pub fn toggle_ime_delayed(&mut self) {
		self.ime_delay = 2;
	}

	/// Cancel a pending `EI` that hasn't taken effect yet (used by `DI`).
	pub fn cancel_ime_delay(&mut self) {
		self.ime_delay = 0;
	}

	/// Apply the given closure to the game controller.
	pub fn with_controller<F>(&mut self, closure: F)
		where F: FnOnce(&mut dyn Controller) -> () {
			closure(&mut self.mmap.joypad);
	}

	/// Direct access to the register file, for fixture-driven tests that
	/// need to establish or inspect an exact pre/post-instruction state.
	pub fn registers(&self) -> &CpuState<'a> {
		&self.registers
	}

	/// Mutable access to the register file; see [`Cpu::registers`].
	pub fn registers_mut(&mut self) -> &mut CpuState<'a> {
		&mut self.registers
	}

	/// Reads the next instruction bytes and increments the program counter appropriately.
	///
	/// The function works in little-endian, that is, when reading 2 bytes,
	/// the first byte will be the least-significant one.
	pub fn fetch<T: PrimInt + AddAssign + Shl<Output=T>>(&mut self) -> Result<T, GameboyError> {
		let mut result: T = num::cast(0).unwrap();

		for i in 0..size_of::<T>() {
			// Read the next byte.
			let pc: u16 = self.registers.get(Register::PC);
			let data: T = num::cast::<u8, T>(self.mmap.read(pc)?).unwrap();

			// We're using little-endianity.
			result += data << num::cast::<usize, T>(8 * i).unwrap();

			// Move the PC forward.
			self.registers.set(Register::PC, pc.wrapping_add(1));
		}

		Ok(result)
	}

	/// The rendered grayscale framebuffer, row-major with row 0 at the top.
	pub fn framebuffer(&self) -> &[u8] {
		self.mmap.ppu.framebuffer()
	}

	/// Emulates the execution of a single instruction.
	///	This function also processes the peripherals and enters interrupts if any.
	///
	/// Returns the number of clock cycles the instruction has taken.
	pub fn execute(&mut self) -> Result<usize, GameboyError> {
		// Commit a pending EI before anything else this step can observe it.
		match self.ime_delay {
			2 => self.ime_delay = 1,
			1 => {
				self.registers.set_ime(true);
				self.ime_delay = 0;
			},
			_ => {},
		}

		// Enter an interrupt if any (and if interrupts are enabled).
		let mut num_cycles = self.handle_interrupts()?;

		if !self.halting {
			num_cycles += self.execute_single()?;
		} else {
			num_cycles += 4;
		}

		// Progress the peripherals.
		self.mmap.process(num_cycles);

		Ok(num_cycles)
	}

	/// Emulates the execution of a single instruction.
	///
	/// Returns the number of clock cycles the instruction has taken.
	pub fn execute_single(&mut self) -> Result<usize, GameboyError> {
		let address: u16 = self.registers.get(Register::PC);

		// Fetch the opcode from the memory.
		let opcode: u8 = self.fetch()?;

		log::trace!("pc={:#06x} opcode={:#04x}", address, opcode);

		// Decode the given opcode.
		let insn: Instruction = self.decode(opcode)?;

		// Execute and return the number of cycles taken.
		insn(self)
	}

	fn handle_interrupts(&mut self) -> Result<usize, GameboyError> {
		let pending = self.mmap.interrupt_enable & self.mmap.interrupt_flag & 0x1F;

		if !self.registers.ime() {
			// Stop halting if there's any active interrupt.
			// We wake the cpu in a case of an interrupt, but we won't
			// enter the ISR if interrupts are disabled.
			if self.halting && pending != 0 {
				self.halting = false;
			}
			return Ok(0);
		}

		if pending == 0 {
			return Ok(0);
		}

		if let Some(interrupt) = self.mmap.fetch_interrupt() {
			// Stop halting (if relevant) and enter the ISR.
			self.halting = false;

			return enter_interrupt(self, interrupt.vector());
		}

		Ok(0)
	}
}

#[cfg(test)]
#[cfg(feature = "alloc")]
pub mod tests {
	use super::*;
	use alloc::boxed::Box;

	/// With-closure for running logic with an initialized cpu instance.
	pub fn with_cpu<F>(callback: F) -> Result<(), GameboyError>
		where F: FnOnce(&mut Cpu) -> Result<(), GameboyError> {
		// Initialize the cpu
		let config = Config::default();
		let mut rom = cartridge::tests::empty_rom(CartridgeType::MBC3);
		let mut ram: Box<[u8]> = Cartridge::make_ram(&rom)?;
		let mut cartridge = Cartridge::new(&mut rom, &mut ram)?;

		let mut cpu = Cpu::new(&config, &mut cartridge);

		callback(&mut cpu)
	}

	#[test]
	fn test_fetch() -> Result<(), GameboyError> {
		with_cpu(|cpu| {
			// Move the program counter to the RAM bank.
			cpu.registers.set(Register::PC, 0xA000);

			// Write arbitrary data to the memory starting from the program counter.
			let data: &[u8] = &[1, 2, 3];
			cpu.mmap.cartridge.set_ram_enabled(true);
			cpu.mmap.write_all(cpu.registers.get(Register::PC), data)?;

			// Make sure that fetch works as expected.
			assert!(cpu.fetch::<u16>()? == 0x0201);
			assert!(cpu.fetch::<u8>()? == 0x03);

			Ok(())
		})
	}

	#[test]
	fn test_ei_delay_takes_effect_after_next_instruction() -> Result<(), GameboyError> {
		with_cpu(|cpu| {
			cpu.registers.set(Register::PC, 0xA000);
			cpu.mmap.cartridge.set_ram_enabled(true);

			// EI; NOP; NOP
			let data: &[u8] = &[0xfb, 0x00, 0x00];
			cpu.mmap.write_all(cpu.registers.get(Register::PC), data)?;

			cpu.execute()?; // EI: still disabled throughout this instruction.
			assert!(!cpu.registers.ime());

			cpu.execute()?; // First NOP after EI: still disabled.
			assert!(!cpu.registers.ime());

			cpu.execute()?; // Second NOP after EI: now enabled.
			assert!(cpu.registers.ime());

			Ok(())
		})
	}

	#[test]
	fn test_di_cancels_pending_ei() -> Result<(), GameboyError> {
		with_cpu(|cpu| {
			cpu.registers.set(Register::PC, 0xA000);
			cpu.mmap.cartridge.set_ram_enabled(true);

			// EI; DI; NOP
			let data: &[u8] = &[0xfb, 0xf3, 0x00];
			cpu.mmap.write_all(cpu.registers.get(Register::PC), data)?;

			cpu.execute()?; // EI
			cpu.execute()?; // DI cancels the pending enable.
			cpu.execute()?; // NOP: would have armed ime here if not cancelled.

			assert!(!cpu.registers.ime());

			Ok(())
		})
	}
}
