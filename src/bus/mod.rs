// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! Emulate the gameboy's memory mapping and bus access.

#[macro_use]
pub mod memory_range;
pub mod cartridge;
pub mod joypad;
pub mod timer;
pub mod rtc;
pub mod ram;
pub mod ppu;
pub mod io;

use io::*;
use ram::*;
use ppu::*;
use timer::*;
use joypad::*;
use cartridge::*;
use memory_range::*;
use timer::consts::MMAP_IO_TIMER;
use ppu::consts::{MMAP_IO_DISPLAY, MMAP_IO_PALETTES};

use crate::GameboyError;
use crate::config::Config;
use crate::cpu::interrupts::*;

/// Bus locations-related constants.
#[allow(missing_docs)]
pub mod consts {
	use super::*;

	pub const MMAP_ROM_BANK0: MemoryRange = make_range!(0x0000, 0x3FFF);
	/// Switchable ROM bank.
	pub const MMAP_ROM_BANK_SW: MemoryRange = make_range!(0x4000, 0x7FFF);
	pub const MMAP_VIDEO_RAM: MemoryRange = make_range!(0x8000, 0x9FFF);
	/// Switchable RAM bank.
	pub const MMAP_RAM_BANK_SW: MemoryRange = make_range!(0xA000, 0xBFFF);
	pub const MMAP_RAM_INTERNAL: MemoryRange = make_range!(0xC000, 0xDFFF);
	/// Maps to the same physical memory as the internal ram.
	pub const MMAP_RAM_ECHO: MemoryRange = make_range!(0xE000, 0xFDFF);
	/// Sprite/Object attribute memory.
	pub const MMAP_SPRITE_OAM: MemoryRange = make_range!(0xFE00, 0xFE9F);
	pub const MMAP_IO_PORTS: MemoryRange = make_range!(0xFF00, 0xFF7F);
	/// High RAM.
	pub const MMAP_RAM_HIGH: MemoryRange = make_range!(0xFF80, 0xFFFE);
	/// Interrupt enable register.
	pub const MMAP_INTERRUPT_EN: MemoryRange = make_range!(0xFFFF, 0xFFFF);
}

use consts::*;

/// A peripheral that can be written and read by the cpu.
pub trait Memory {
	/// Write a 8-bit value to the peripheral.
	///
	/// * `address` - The absolute memory address to write into.
	/// * `value` - The value to write.
	fn write(&mut self, address: u16, value: u8) -> Result<(), GameboyError>;

	/// Read a 8-bit value from this peripheral.
	///
	/// * `address` - The absolute memory address to read from.
	fn read(&self, address: u16) -> Result<u8, GameboyError>;
}

/// An in-progress OAM-DMA transfer: `FF46` schedules a copy of 160 bytes from
/// `source_base..source_base+0x9F` into OAM, one byte per M-cycle, independent
/// of CPU instruction boundaries.
struct DmaTransfer {
	source_base: u16,
	next_index: u16,
}

/// A virtual representation of Gameboy (Color) memory bus.
///
/// This implementation provides memory/peripheral abstraction.
pub struct SystemBus<'a> {
	pub(crate) cartridge: &'a mut Cartridge<'a>,
	pub(crate) ppu: Ppu,
	pub(crate) io: IoPorts,
	pub(crate) timer: Timer,
	pub(crate) joypad: Joypad,
	pub(crate) ram: InternalRam,

	/// The IF register.
	pub interrupt_flag: InterruptMask,
	/// The IE register.
	pub interrupt_enable: InterruptMask,

	/// The last byte written to the DMA trigger register (FF46).
	dma_register: u8,
	/// Active OAM-DMA transfer, if any.
	dma: Option<DmaTransfer>,
}

/// An abstraction for fetching mutable and immutable regions.
macro_rules! get_region {
	($name:tt $(,$mut_:tt)*) => {
		/// Returns the region that contains the given address.
		fn $name(&$($mut_)* self, address: u16) -> Result<&$($mut_)* dyn Memory, GameboyError> {
			match address {
				// Cartridge-mapped offsets
				memory_range!(MMAP_ROM_BANK0) |
				memory_range!(MMAP_ROM_BANK_SW) |
				memory_range!(MMAP_RAM_BANK_SW) => {
					Ok(&$($mut_)* (*self.cartridge))
				}

				// Internal RAM
				memory_range!(MMAP_RAM_INTERNAL) |
				memory_range!(MMAP_RAM_ECHO) |
				memory_range!(MMAP_RAM_HIGH) => {
					Ok(&$($mut_)* self.ram)
				}

				// Timer
				memory_range!(MMAP_IO_TIMER) => {
					Ok(&$($mut_)* self.timer)
				}

				// DMA and internal IO registers
				io::consts::IO_DMA |
				io::consts::IO_IF |
				io::consts::IO_IE => {
					Ok(&$($mut_)* *self)
				}

				// Display
				memory_range!(MMAP_IO_DISPLAY) |
				memory_range!(MMAP_IO_PALETTES) |
				memory_range!(MMAP_VIDEO_RAM) |
				memory_range!(MMAP_SPRITE_OAM) => {
					Ok(&$($mut_)* self.ppu)
				}

				// Joypad
				joypad::consts::IO_P1 => {
					Ok(&$($mut_)* self.joypad)
				}

				// I/O registers
				memory_range!(MMAP_IO_PORTS) => {
					Ok(&$($mut_)* self.io)
				}
				_ => {
					Err(GameboyError::Io("Accessed an unmapped region."))
				}
			}
		}
	}
}

impl<'a> SystemBus<'a> {
	/// Initialize a new address space.
	pub fn new(config: &'a Config, cartridge: &'a mut Cartridge<'a>) -> Self {
		SystemBus {
			cartridge,
			ppu: Ppu::new(),
			io: IoPorts::new(config),
			timer: Timer::new(config),
			joypad: Joypad::new(),
			ram: InternalRam::new(),
			interrupt_flag: 0,
			interrupt_enable: 0,
			dma_register: 0,
			dma: None,
		}
	}

	/// Update the system bus peripherals' state according to the elapsed time
	/// (given in T-cycles; 4 T-cycles per M-cycle).
	pub fn process(&mut self, cycles: usize) {
		let elapsed = if cycles > 0 { cycles } else { 4 };

		self.step_dma(elapsed);

		self.ppu.process(elapsed);
		self.timer.process(elapsed);
		self.joypad.process(elapsed);

		// Update interrupts state. IE only gates dispatch (see
		// `Cpu::handle_interrupts`/`fetch_interrupt`); it must never clear a
		// pending-but-currently-disabled IF bit, since that bit has to stay
		// live and become dispatchable the moment IE is turned on.
		self.interrupt_flag |= self.ppu.interrupts();
		self.interrupt_flag |= self.timer.interrupts();
		self.interrupt_flag |= self.joypad.interrupts();

		self.ppu.clear();
		self.timer.clear();
		self.joypad.clear();
	}

	/// Step any in-progress OAM-DMA transfer by one byte per M-cycle.
	fn step_dma(&mut self, cycles: usize) {
		let m_cycles = cycles / 4;

		for _ in 0..m_cycles {
			let (source_base, index) = match &self.dma {
				Some(dma) => (dma.source_base, dma.next_index),
				None => break,
			};

			let source = source_base.wrapping_add(index);
			let data = self.read(source).unwrap_or(0xFF);
			self.ppu.oam_mut()[index as usize] = data;

			match &mut self.dma {
				Some(dma) => {
					dma.next_index += 1;
					if dma.next_index >= 0xA0 {
						self.dma = None;
					}
				}
				None => {}
			}
		}
	}

	/// Handle writing to a memory region.
	/// The function calls the relevent peripheral's implementation.
	pub fn write(&mut self, address: u16, value: u8) -> Result<(), GameboyError> {
		let peripheral = self.region_mut(address)?;

		peripheral.write(address, value)
	}

	/// Handle reading from a memory region.
	/// The function calls the relevent peripheral's implementation.
	pub fn read(&self, address: u16) -> Result<u8, GameboyError> {
		let peripheral = self.region(address)?;

		peripheral.read(address)
	}

	/// Returns a waiting, enabled interrupt and removes it from the queue.
	///
	/// Only bits set in both `interrupt_flag` *and* `interrupt_enable` are
	/// candidates: a pending-but-masked source must never be popped (and so
	/// cleared) just because it happens to be the highest-priority bit set in
	/// `interrupt_flag` alone.
	pub fn fetch_interrupt(&mut self) -> Option<Interrupt> {
		let dispatchable = self.interrupt_flag & self.interrupt_enable;
		let mut iter = InterruptIter::new(dispatchable);
		let interrupt = iter.next();

		if let Some(ref found) = interrupt {
			self.interrupt_flag &= !found.value();
		}

		interrupt
	}

	// Get an immutable region
	get_region!(region);

	// Get a mutable region
	get_region!(region_mut, mut);
}

/// Certain registers needs access to multiple peripherals.
/// These registers will be implemented here.
mod private {
	use super::*;

	// Implement read/write operations for internal registers.
	impl<'a> Memory for SystemBus<'a> {

		fn write(&mut self, address: u16, value: u8) -> Result<(), GameboyError> {
			match address {
				io::consts::IO_DMA => {
					self.dma_register = value;
					self.dma = Some(DmaTransfer {
						source_base: (value as u16) << 8,
						next_index: 0,
					});

					Ok(())
				}
				io::consts::IO_IF => {
					self.interrupt_flag = value & 0x1F;

					Ok(())
				}
				io::consts::IO_IE => {
					self.interrupt_enable = value;

					Ok(())
				}
				_ => {
					Err(GameboyError::BadAddress(address))
				}
			}
		}

		fn read(&self, address: u16) -> Result<u8, GameboyError> {
			match address {
				io::consts::IO_DMA => {
					Ok(self.dma_register)
				}
				io::consts::IO_IF => {
					Ok(self.interrupt_flag)
				}
				io::consts::IO_IE => {
					Ok(self.interrupt_enable)
				}
				_ => {
					Err(GameboyError::BadAddress(address))
				}
			}
		}
	}
}

#[cfg(test)]
impl<'a> SystemBus<'a> {
	/// Writes the complete array's bytes to the relevant memory region.
	pub fn write_all(&mut self, address: u16, array: &[u8]) -> Result<(), GameboyError> {
		for (index, value) in array.iter().enumerate() {
			self.write(address + (index as u16), *value)?;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::cartridge::tests::empty_rom;
    use crate::bus::cartridge::CartridgeType;

    #[test]
    fn test_memory_range() {
    	let int_enable_ptr: u16 = 0xFFFF;
    	let ram_ptr: u16 = 0xA100;

    	match int_enable_ptr {
    		memory_range!(MMAP_INTERRUPT_EN) => { }
    		_ => { assert!(false); }
    	}

    	match ram_ptr {
    		memory_range!(MMAP_RAM_BANK_SW) => { }
    		_ => { assert!(false); }
    	}
    }

    #[test]
    fn test_oam_dma_takes_160_m_cycles() -> Result<(), GameboyError> {
    	let config = Config::default();
    	let mut rom = empty_rom(CartridgeType::MBC3);
    	let mut ram = Cartridge::make_ram(&rom)?;
    	let mut cartridge = Cartridge::new(&mut rom, &mut ram)?;
    	let mut bus = SystemBus::new(&config, &mut cartridge);

    	bus.cartridge.set_ram_enabled(true);
    	bus.write_all(0xC000, &[0xAB; 0xA0])?;

    	bus.write(0xFF46, 0xC0)?;

    	// Fewer than 160 M-cycles: the copy is still in progress.
    	bus.process(159 * 4);
    	assert!(bus.ppu.oam_mut()[0x9F] != 0xAB || bus.dma.is_some());

    	// The remaining M-cycle finishes the transfer.
    	bus.process(4);
    	assert!(bus.dma.is_none());
    	assert_eq!(bus.ppu.oam_mut()[0], 0xAB);
    	assert_eq!(bus.ppu.oam_mut()[0x9F], 0xAB);

    	Ok(())
    }

    #[test]
    fn test_ie_does_not_mutate_if() {
    	let config = Config::default();
    	let mut rom = empty_rom(CartridgeType::MBC3);
    	let mut ram = Cartridge::make_ram(&rom).unwrap();
    	let mut cartridge = Cartridge::new(&mut rom, &mut ram).unwrap();
    	let mut bus = SystemBus::new(&config, &mut cartridge);

    	// Request Timer (bit 2) while every interrupt is disabled.
    	bus.interrupt_flag = 0x04;
    	bus.interrupt_enable = 0x00;

    	bus.process(4);

    	// The pending-but-masked bit must survive.
    	assert_eq!(bus.interrupt_flag, 0x04);
    	assert!(bus.fetch_interrupt().is_none());

    	// Enabling it makes it dispatchable without anything re-requesting it.
    	bus.interrupt_enable = 0x04;
    	assert!(bus.fetch_interrupt().is_some());
    }
}
