//! End-to-end cassette flows: enumeration, fast loading, rewriting.

use std::cell::RefCell;
use std::rc::Rc;

use emu_core::FlatBus;
use format_cas::CasTape;
use format_fsk::{
    CellTiming, Decoder, Encoder, KIND_DATA, KIND_EOF, KIND_NAME, MemoryTape, NameBlock, Pulse,
    SYNC_BYTE, TapeError, TapeOutput,
};

use emu_dragon::{CassetteMachine, MachineConfig};

fn name_payload(name: &str, exec: u16, load: u16) -> Vec<u8> {
    let mut data = vec![b' '; 8];
    data[..name.len()].copy_from_slice(name.as_bytes());
    data.extend_from_slice(&[2, 0, 0]);
    data.extend_from_slice(&exec.to_be_bytes());
    data.extend_from_slice(&load.to_be_bytes());
    data
}

/// A complete single-file recording: leader, name block, data block, EOF.
fn recording(payload: &[u8]) -> MemoryTape {
    let timing = CellTiming::dragon();
    let mut enc = Encoder::new(MemoryTape::new(), timing);
    enc.leader(128).expect("leader");
    enc.sync().expect("sync");
    enc.block_out(KIND_NAME, &name_payload("GAME", 0x4000, 0x3000))
        .expect("name block");
    enc.leader(48).expect("leader");
    enc.sync().expect("sync");
    enc.block_out(KIND_DATA, payload).expect("data block");
    enc.leader(48).expect("leader");
    enc.sync().expect("sync");
    enc.block_out(KIND_EOF, &[]).expect("eof block");
    let mut tape = enc.into_inner();
    tape.rewind();
    tape
}

fn machine() -> CassetteMachine {
    CassetteMachine::new(MachineConfig::dragon64(), Box::new(FlatBus::new()))
}

/// Run one shadowed firmware routine at `hook`, returning to $1234.
fn run_routine(m: &mut CassetteMachine, hook: u16) {
    m.core_mut().bus.write(0x7FFE, 0x12);
    m.core_mut().bus.write(0x7FFF, 0x34);
    let regs = m.core_mut().regs.as_mut();
    regs.set_sp(0x7FFE);
    regs.set_pc(hook);
    m.check_instruction();
}

/// Hunt the sync byte through the single-bit routine, the way the firmware
/// block reader does.
fn hunt_sync(m: &mut CassetteMachine, bit_in: u16) {
    let mut window = 0u8;
    while window != SYNC_BYTE {
        run_routine(m, bit_in);
        window >>= 1;
        if m.core().regs.carry() {
            window |= 0x80;
        }
    }
}

fn read_byte(m: &mut CassetteMachine, byte_in: u16) -> u8 {
    run_routine(m, byte_in);
    m.core().regs.a()
}

#[test]
fn listing_then_reopening_by_offset_reads_the_directory_entry() {
    let mut m = machine();
    m.attach_input(Box::new(recording(&[0xDE, 0xAD, 0xBE, 0xEF])))
        .expect("attach");

    let files = m.list_files(false);
    assert_eq!(files.len(), 1);
    let info = files[0].clone();
    assert_eq!(info.name, "GAME");
    assert_eq!(info.file_type, 2);
    assert_eq!(info.exec_addr, 0x4000);
    assert_eq!(info.load_addr, 0x3000);
    assert!(!info.checksum_error);

    // Re-open at the recorded offset: the same name block comes back.
    m.seek_input(info.offset).expect("seek");
    let tape = m.detach_input().expect("input attached");
    let mut dec = Decoder::new(tape, CellTiming::dragon());
    let block = dec.block_in().expect("block");
    let name = NameBlock::parse(&block).expect("name block");
    assert_eq!(name.name, "GAME");
    assert_eq!(name.fingerprint, info.fingerprint);
}

#[test]
fn fast_load_reads_a_whole_file_from_a_cas_image() {
    // Express the recording as a CAS byte image to cover the container
    // path end to end.
    let payload: Vec<u8> = (0..32u8).collect();
    let mut dec = Decoder::new(recording(&payload), CellTiming::dragon());
    let mut image = Vec::new();
    while let Ok(byte) = dec.byte_in() {
        image.push(byte);
    }
    let cas = CasTape::from_bytes(image, CellTiming::dragon());

    let mut m = machine();
    m.attach_input(Box::new(cas)).expect("attach");
    m.set_fast_loading(true);
    m.set_motor(true);
    let hooks = m.core().config.hooks;

    // Firmware sequence: motor on, leader lock, sync hunt, block bytes.
    run_routine(&mut m, hooks.motor_on);
    run_routine(&mut m, hooks.sync_leader);
    assert_eq!(m.core().regs.pc(), 0x1234);
    hunt_sync(&mut m, hooks.bit_in);

    assert_eq!(read_byte(&mut m, hooks.byte_in), KIND_NAME);
    let length = read_byte(&mut m, hooks.byte_in);
    assert_eq!(length, 15);
    let block: Vec<u8> = (0..length)
        .map(|_| read_byte(&mut m, hooks.byte_in))
        .collect();
    assert_eq!(&block[..4], b"GAME");
    assert_eq!(&block[11..13], &0x4000u16.to_be_bytes());

    // Virtual time advanced with the consumed pulses.
    assert!(m.now().get() > 0);
    assert!(!m.deck().no_signal());
}

/// Test adapter: an output tape that stays readable after the machine is
/// done with it.
#[derive(Clone, Default)]
struct SharedTape(Rc<RefCell<MemoryTape>>);

impl TapeOutput for SharedTape {
    fn pulse_out(&mut self, pulse: Pulse) -> Result<(), TapeError> {
        self.0.borrow_mut().pulse_out(pulse)
    }

    fn tell(&self) -> u64 {
        TapeOutput::tell(&*self.0.borrow())
    }
}

/// Decoded bits until the sync byte appears, as whole leader bytes.
fn leader_bytes_before_sync(dec: &mut Decoder<MemoryTape>) -> u64 {
    let mut window = 0u8;
    let mut bits = 0u64;
    while window != SYNC_BYTE {
        window >>= 1;
        if dec.bit_in().expect("bit") {
            window |= 0x80;
        }
        bits += 1;
    }
    (bits - 8) / 8
}

#[test]
fn rewrite_produces_a_clean_loadable_copy() {
    let payload: Vec<u8> = (100..116u8).collect();
    let shared = SharedTape::default();

    let mut m = machine();
    m.attach_input(Box::new(recording(&payload)))
        .expect("attach");
    m.attach_output(Box::new(shared.clone()));
    m.set_fast_loading(true);
    m.set_rewriting(true);
    m.set_motor(true);
    let hooks = m.core().config.hooks;

    // Load the name and data blocks through the shadow routines, touching
    // the block-end return point the way the firmware would.
    run_routine(&mut m, hooks.motor_on);
    for _ in 0..2 {
        run_routine(&mut m, hooks.sync_leader);
        hunt_sync(&mut m, hooks.bit_in);
        let _kind = read_byte(&mut m, hooks.byte_in);
        let length = read_byte(&mut m, hooks.byte_in);
        for _ in 0..=length {
            // Data plus the trailing sum byte.
            read_byte(&mut m, hooks.byte_in);
        }
        run_routine(&mut m, hooks.block_end);
    }
    m.detach_output().expect("close rewrite");

    // The rewritten tape: silence, a full-length leader, the name block,
    // a short leader, the data block. It must decode cleanly.
    let mut copy = shared.0.borrow().clone();
    copy.rewind();
    let mut dec = Decoder::new(copy, CellTiming::dragon());

    assert_eq!(leader_bytes_before_sync(&mut dec), 128);
    let name_block = dec.block_in().expect("name block");
    assert!(name_block.checksum_ok());
    let name = NameBlock::parse(&name_block).expect("name block");
    assert_eq!(name.name, "GAME");

    assert_eq!(leader_bytes_before_sync(&mut dec), 48 + 1);
    let data_block = dec.block_in().expect("data block");
    assert!(data_block.checksum_ok());
    assert_eq!(data_block.kind, KIND_DATA);
    assert_eq!(data_block.data, payload);
}
