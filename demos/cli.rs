// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Thin host loop that exercises the core end to end: load a ROM (and its
//! save file, if any), run a fixed number of frames, dump the save file on
//! exit. No window, no audio: presentation is out of scope for this crate.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use gameboy_core::GameboyError;
use gameboy_core::bus::cartridge::Cartridge;
use gameboy_core::config::Config;
use gameboy_core::emulator::Emulator;

/// Run a Game Boy ROM headlessly for a fixed number of frames.
#[derive(Parser)]
struct Args {
	/// Path to the ROM image to load.
	rom: PathBuf,

	/// Number of frames to run before exiting.
	#[arg(long, default_value_t = 60)]
	frames: u32,
}

fn save_path(rom: &std::path::Path) -> PathBuf {
	let mut path = rom.to_path_buf();
	let name = format!(
		"{}_save",
		rom.file_stem().and_then(|s| s.to_str()).unwrap_or("rom")
	);
	path.set_file_name(name);
	path
}

fn run(args: Args) -> Result<(), GameboyError> {
	let mut rom = fs::read(&args.rom).map_err(|_| GameboyError::Io("failed to read ROM file"))?;
	let mut ram = Cartridge::make_ram(&rom)?;
	let mut cartridge = Cartridge::new(&mut rom, &mut ram)?;

	let info = cartridge.info();
	let save_file = save_path(&args.rom);

	if info.battery {
		if let Ok(data) = fs::read(&save_file) {
			if let Err(err) = cartridge.load_save(&data) {
				log::warn!("ignoring save file {:?}: {}", save_file, err);
			}
		}
	}

	let config = Config::default();
	let mut emulator = Emulator::new(&config, &mut cartridge);

	for _ in 0..args.frames {
		emulator.step_frame()?;
	}

	if info.battery {
		if let Err(err) = fs::write(&save_file, cartridge.dump_save()) {
			log::warn!("failed to write save file {:?}: {}", save_file, err);
		}
	}

	Ok(())
}

fn main() -> ExitCode {
	env_logger::init();

	let args = Args::parse();

	match run(args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			eprintln!("error: {}", err);
			ExitCode::FAILURE
		}
	}
}
