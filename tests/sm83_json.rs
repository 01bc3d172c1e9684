// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-opcode property tests against the public SingleStepTests/sm83 JSON
//! vector corpus, plus a handful of hand-written end-to-end scenarios that
//! don't need external fixtures.
//!
//! The vector pass is opt-in: set `SM83_JSON_VECTORS` to a directory holding
//! `<op>.json` / `cb <op>.json` files (the format the original project's own
//! `JsonTest.cpp` harness consumed) and every file in it is loaded and
//! checked. Without it, this still runs (and `cargo test` stays green
//! without a network fetch) but only exercises the scenarios below.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use gameboy_core::GameboyError;
use gameboy_core::bus::Memory;
use gameboy_core::bus::cartridge::{Cartridge, CartridgeType};
use gameboy_core::config::Config;
use gameboy_core::cpu::Cpu;
use gameboy_core::cpu::state::registers::Register;

const ROM_BANK_SIZE: usize = 0x4000;

/// Undefined opcodes the hardware leaves unimplemented; the vector corpus
/// carries files for them, but this core treats them as no-ops and must not
/// be held to the corpus's (hardware-lockup) expectations for these.
const SKIPPED_OPCODES: &[&str] = &[
	"d3", "db", "dd", "e3", "e4", "eb", "ec", "ed", "f4", "fc", "fd",
];

fn minimal_rom(kind: CartridgeType, bank_count_code: u8) -> Vec<u8> {
	let banks = 2usize << bank_count_code;
	let mut rom = vec![0_u8; ROM_BANK_SIZE * banks];

	rom[0x0147] = match kind {
		CartridgeType::RomOnly => 0x00,
		CartridgeType::MBC1 => 0x01,
		CartridgeType::MBC3 => 0x12,
		CartridgeType::MBC5 => 0x19,
	};
	rom[0x0148] = bank_count_code;
	// 8 KiB of external RAM: the vector corpus's fixtures occasionally touch
	// 0xA000-0xBFFF as plain memory, so give them somewhere real to land.
	rom[0x0149] = 0x02;

	rom
}

fn new_cartridge<'a>(rom: &'a mut [u8], ram: &'a mut [u8]) -> Result<Cartridge<'a>, GameboyError> {
	Cartridge::new(rom, ram)
}

#[derive(Deserialize)]
struct VectorState {
	pc: u16,
	sp: u16,
	a: u8,
	b: u8,
	c: u8,
	d: u8,
	e: u8,
	f: u8,
	h: u8,
	l: u8,
	ime: u8,
	#[allow(unused)]
	ie: Option<u8>,
	ram: Vec<(u16, u8)>,
}

#[derive(Deserialize)]
struct Vector {
	#[allow(unused)]
	name: String,
	initial: VectorState,
	#[serde(rename = "final")]
	expected: VectorState,
	cycles: Vec<serde_json::Value>,
}

fn apply_state(cpu: &mut Cpu, state: &VectorState) -> Result<(), GameboyError> {
	let regs = cpu.registers_mut();
	regs.set(Register::PC, state.pc);
	regs.set(Register::SP, state.sp);
	regs.set(Register::A, state.a as u16);
	regs.set(Register::B, state.b as u16);
	regs.set(Register::C, state.c as u16);
	regs.set(Register::D, state.d as u16);
	regs.set(Register::E, state.e as u16);
	regs.set(Register::F, state.f as u16);
	regs.set(Register::H, state.h as u16);
	regs.set(Register::L, state.l as u16);
	regs.set_ime(state.ime != 0);

	for &(addr, value) in &state.ram {
		cpu.mmap.write(addr, value)?;
	}

	Ok(())
}

fn check_state(cpu: &Cpu, state: &VectorState) -> Result<(), String> {
	let regs = cpu.registers();
	let got = (
		regs.get(Register::PC), regs.get(Register::SP), regs.get(Register::A) as u8,
		regs.get(Register::B) as u8, regs.get(Register::C) as u8, regs.get(Register::D) as u8,
		regs.get(Register::E) as u8, regs.get(Register::F) as u8, regs.get(Register::H) as u8,
		regs.get(Register::L) as u8,
	);
	let want = (
		state.pc, state.sp, state.a, state.b, state.c, state.d, state.e, state.f, state.h, state.l,
	);

	if got != want {
		return Err(format!("register mismatch: got {:?}, want {:?}", got, want));
	}

	for &(addr, value) in &state.ram {
		let actual = cpu.mmap.read(addr).map_err(|e| e.to_string())?;
		if actual != value {
			return Err(format!("ram[{:#06x}] mismatch: got {:#04x}, want {:#04x}", addr, value, actual));
		}
	}

	Ok(())
}

fn run_vector(vector: &Vector) -> Result<(), String> {
	let config = Config::default();
	let mut rom = minimal_rom(CartridgeType::MBC3, 0x05);
	let mut ram = Cartridge::make_ram(&rom).map_err(|e| e.to_string())?;
	let mut cartridge = new_cartridge(&mut rom, &mut ram).map_err(|e| e.to_string())?;
	cartridge.set_ram_enabled(true);

	let mut cpu = Cpu::new(&config, &mut cartridge);
	apply_state(&mut cpu, &vector.initial).map_err(|e| e.to_string())?;

	let expected_m_cycles = vector.cycles.len();
	let mut total_cycles = 0;

	// A single step may include a pending-interrupt dispatch ahead of the
	// instruction itself in the general case, but these fixtures never
	// arm IE, so one `execute_single` call is exactly one vector.
	total_cycles += cpu.execute_single().map_err(|e| e.to_string())? / 4;

	if total_cycles != expected_m_cycles {
		return Err(format!(
			"m-cycle count mismatch: got {}, want {}", total_cycles, expected_m_cycles
		));
	}

	check_state(&cpu, &vector.expected)
}

#[test]
fn test_sm83_json_vectors() {
	let dir = match env::var("SM83_JSON_VECTORS") {
		Ok(dir) => dir,
		Err(_) => {
			eprintln!("SM83_JSON_VECTORS not set; skipping external opcode vector pass");
			return;
		}
	};

	let path = Path::new(&dir);
	if !path.is_dir() {
		eprintln!("SM83_JSON_VECTORS={:?} is not a directory; skipping", dir);
		return;
	}

	let mut failures: HashMap<String, String> = HashMap::new();
	let mut checked = 0usize;

	for entry in fs::read_dir(path).expect("read SM83_JSON_VECTORS directory") {
		let entry = entry.expect("read directory entry");
		let file_name = entry.file_name().to_string_lossy().into_owned();

		let opcode = file_name.trim_end_matches(".json").to_lowercase();
		if SKIPPED_OPCODES.iter().any(|&op| opcode == op || opcode.ends_with(&format!(" {}", op))) {
			continue;
		}

		let data = fs::read_to_string(entry.path()).expect("read vector file");
		let vectors: Vec<Vector> = serde_json::from_str(&data).expect("parse vector file");

		for vector in &vectors {
			checked += 1;
			if let Err(err) = run_vector(vector) {
				failures.insert(format!("{}/{}", file_name, vector.name), err);
			}
		}
	}

	assert_eq!(checked > 0, true, "expected at least one vector under {:?}", dir);
	assert!(failures.is_empty(), "{} opcode vector failures: {:#?}", failures.len(), failures);
}

#[test]
fn test_empty_program_runs_70224_t_cycles_of_nops() -> Result<(), GameboyError> {
	let mut rom = minimal_rom(CartridgeType::RomOnly, 0);
	let mut ram = Cartridge::make_ram(&rom)?;
	let mut cartridge = new_cartridge(&mut rom, &mut ram)?;

	let config = Config::default();
	let mut cpu = Cpu::new(&config, &mut cartridge);

	let mut total = 0usize;
	while total < 70_224 {
		total += cpu.execute()?;
	}

	// 70224 / 4 NOPs executed from PC=0x0100, wrapping through the ROM.
	let expected_pc = 0x0100u16.wrapping_add((70_224 / 4) as u16);
	assert_eq!(cpu.registers().get(Register::PC), expected_pc);
	assert!(cpu.framebuffer().iter().all(|&p| p == 0xFF));

	Ok(())
}

#[test]
fn test_daa_after_addition() -> Result<(), GameboyError> {
	let mut rom = minimal_rom(CartridgeType::RomOnly, 0);
	// ADD A, B; DAA
	rom[0x0100] = 0x80;
	rom[0x0101] = 0x27;

	let mut ram = Cartridge::make_ram(&rom)?;
	let mut cartridge = new_cartridge(&mut rom, &mut ram)?;

	let config = Config::default();
	let mut cpu = Cpu::new(&config, &mut cartridge);

	let regs = cpu.registers_mut();
	regs.set(Register::A, 0x45);
	regs.set(Register::B, 0x38);
	regs.set(Register::F, 0x00);

	cpu.execute_single()?; // ADD A, B
	cpu.execute_single()?; // DAA

	assert_eq!(cpu.registers().get(Register::A), 0x83);
	assert_eq!(cpu.registers().get(Register::F), 0x00);

	Ok(())
}

#[test]
fn test_halt_wakes_on_enabled_timer_interrupt() -> Result<(), GameboyError> {
	let mut rom = minimal_rom(CartridgeType::RomOnly, 0);
	// EI; LD A,0x04; LDH (FF),A ; LD A,0x05; LDH (07),A ; HALT
	let program: &[u8] = &[0xFB, 0x3E, 0x04, 0xE0, 0xFF, 0x3E, 0x05, 0xE0, 0x07, 0x76];
	rom[0x0100..0x0100 + program.len()].copy_from_slice(program);

	let mut ram = Cartridge::make_ram(&rom)?;
	let mut cartridge = new_cartridge(&mut rom, &mut ram)?;
	let config = Config::default();
	let mut cpu = Cpu::new(&config, &mut cartridge);

	let mut dispatched = false;
	for _ in 0..1_000_000 {
		cpu.execute()?;
		if cpu.registers().get(Register::PC) == 0x0050 {
			dispatched = true;
			break;
		}
	}

	assert!(dispatched, "timer interrupt never dispatched");
	assert!(!cpu.registers().ime());

	// The stack holds the post-HALT return address: the byte right after
	// the HALT opcode at 0x0109.
	let sp = cpu.registers().get(Register::SP);
	let lo = cpu.mmap.read(sp)? as u16;
	let hi = cpu.mmap.read(sp.wrapping_add(1))? as u16;
	assert_eq!(lo | (hi << 8), 0x0109);

	Ok(())
}

#[test]
fn test_window_activation_covers_entire_screen() -> Result<(), GameboyError> {
	let mut rom = minimal_rom(CartridgeType::RomOnly, 0);
	let mut ram = Cartridge::make_ram(&rom)?;
	let mut cartridge = new_cartridge(&mut rom, &mut ram)?;
	let config = Config::default();
	let mut cpu = Cpu::new(&config, &mut cartridge);

	// Tile 0's pattern data is color 3 throughout, tile 1's is color 1
	// throughout. Background tile map (0x9800) points at tile 0, window
	// tile map (0x9C00) points at tile 1.
	cpu.mmap.write(0xFF40, 0x00)?; // LCDC off while VRAM is seeded
	for row in 0..8u16 {
		cpu.mmap.write(0x8000 + row * 2, 0xFF)?; // tile 0: color 3
		cpu.mmap.write(0x8000 + row * 2 + 1, 0xFF)?;
		cpu.mmap.write(0x8010 + row * 2, 0xFF)?; // tile 1: color 1
		cpu.mmap.write(0x8010 + row * 2 + 1, 0x00)?;
	}
	for i in 0..1024u16 {
		cpu.mmap.write(0x9800 + i, 0)?; // background: tile 0
		cpu.mmap.write(0x9C00 + i, 1)?; // window: tile 1
	}
	cpu.mmap.write(0xFF47, 0xE4)?; // BGP: identity palette
	cpu.mmap.write(0xFF4A, 0x00)?; // WY = 0
	cpu.mmap.write(0xFF4B, 0x07)?; // WX = 7
	// LCDC: display on, window tile map at 0x9C00, window enabled,
	// BG+window tile data at 0x8000 (unsigned), BG/window master enable on.
	cpu.mmap.write(0xFF40, 0xF1)?;

	// Run a bit over one full frame's worth of T-cycles so every scanline
	// has rendered at least once.
	let mut total = 0usize;
	while total < 70_224 + 456 {
		total += cpu.execute()?;
	}

	let shade_for_color_1 = 0xAA;
	assert!(cpu.framebuffer().iter().all(|&p| p == shade_for_color_1));

	Ok(())
}

#[test]
fn test_mbc1_bank_zero_wraps_to_bank_one() -> Result<(), GameboyError> {
	let mut rom = minimal_rom(CartridgeType::MBC1, 0x05); // 64 banks
	for bank in 0..64usize {
		rom[bank * ROM_BANK_SIZE] = bank as u8;
	}

	let mut ram = Cartridge::make_ram(&rom)?;
	let mut cartridge = new_cartridge(&mut rom, &mut ram)?;

	cartridge.write(0x2000, 0x00)?;
	assert_eq!(cartridge.read(0x4000)?, 1);

	Ok(())
}
