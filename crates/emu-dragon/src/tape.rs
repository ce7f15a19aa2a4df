//! The cassette deck: attached tapes, motor state, file enumeration.

use std::io::SeekFrom;

use emu_core::EventId;
use format_fsk::{
    CellTiming, Decoder, Encoder, NameBlock, SYNC_BYTE, TapeError, TapeInput, TapeOutput,
};

use crate::rewrite::Rewriter;

/// Directory entry scanned from a tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeFileInfo {
    pub name: String,
    pub file_type: u8,
    pub ascii: bool,
    pub gapped: bool,
    pub load_addr: u16,
    pub exec_addr: u16,
    /// Content fingerprint of the name block.
    pub fingerprint: u16,
    /// Input offset of the block body; seeking here re-reads the block.
    pub offset: u64,
    pub checksum_error: bool,
}

pub(crate) struct InputDeck {
    pub dec: Decoder<Box<dyn TapeInput>>,
    /// Whether the tape's first leader is too short for the firmware
    /// motor-on delay. Measured once at attach.
    pub short_leader: bool,
}

pub(crate) struct OutputDeck {
    pub enc: Encoder<Box<dyn TapeOutput>>,
    pub rewrite: Rewriter,
}

/// One cassette deck: at most one input and one output tape.
#[derive(Default)]
pub struct TapeDeck {
    pub(crate) input: Option<InputDeck>,
    pub(crate) output: Option<OutputDeck>,
    pub(crate) motor: bool,
    /// Pending playback event on the machine scheduler.
    pub(crate) playback: Option<EventId>,
    /// Input signal level last delivered by playback.
    pub(crate) level: bool,
    /// Set when the input ran out of pulses; cleared by seek or re-attach.
    pub(crate) no_signal: bool,
}

impl TapeDeck {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn motor(&self) -> bool {
        self.motor
    }

    #[must_use]
    pub fn level(&self) -> bool {
        self.level
    }

    #[must_use]
    pub fn no_signal(&self) -> bool {
        self.no_signal
    }

    #[must_use]
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    #[must_use]
    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Whether the attached input tape opens with a short leader.
    #[must_use]
    pub fn short_leader(&self) -> bool {
        self.input.as_ref().is_some_and(|i| i.short_leader)
    }

    /// Attach an input tape, measuring its first leader against
    /// `short_leader_threshold` (in bytes) and rewinding.
    pub fn attach_input(
        &mut self,
        tape: Box<dyn TapeInput>,
        timing: CellTiming,
        short_leader_threshold: u32,
    ) -> Result<(), TapeError> {
        let mut dec = Decoder::new(tape, timing);
        let leader_bytes = measure_leader(&mut dec);
        let short_leader =
            leader_bytes.is_some_and(|bytes| bytes < u64::from(short_leader_threshold));
        if let Some(bytes) = leader_bytes {
            log::info!("input tape attached, {bytes}-byte leader (short: {short_leader})");
        } else {
            log::info!("input tape attached, no sync byte found");
        }
        dec.tape_mut().seek(SeekFrom::Start(0))?;
        self.input = Some(InputDeck { dec, short_leader });
        self.no_signal = false;
        Ok(())
    }

    /// Detach the input tape, returning its backend.
    pub fn detach_input(&mut self) -> Option<Box<dyn TapeInput>> {
        self.no_signal = false;
        self.input.take().map(|i| i.dec.into_inner())
    }

    /// Attach an output tape with a fresh rewriter.
    pub fn attach_output(&mut self, tape: Box<dyn TapeOutput>, timing: CellTiming) {
        let mut enc = Encoder::new(tape, timing);
        // Backends that monitor their own output re-read it with some
        // input hysteresis to keep the synthesized edges from chattering.
        enc.tape_mut().hint_hysteresis(25);
        self.output = Some(OutputDeck {
            enc,
            rewrite: Rewriter::new(timing),
        });
    }

    /// Detach the output tape, closing out any rewrite in progress.
    pub fn detach_output(&mut self) -> Result<Option<Box<dyn TapeOutput>>, TapeError> {
        let Some(mut out) = self.output.take() else {
            return Ok(None);
        };
        out.rewrite.close(&mut out.enc)?;
        Ok(Some(out.enc.into_inner()))
    }

    /// Reposition the input tape. Any rewrite in progress is closed out
    /// first; a repositioned source can no longer continue a block.
    pub fn seek_input(&mut self, offset: u64) -> Result<u64, TapeError> {
        if let Some(out) = self.output.as_mut() {
            out.rewrite.desync(&mut out.enc)?;
        }
        let input = self.input.as_mut().ok_or(TapeError::NoPulses)?;
        let pos = input.dec.tape_mut().seek(SeekFrom::Start(offset))?;
        self.no_signal = false;
        Ok(pos)
    }

    /// Rewind the input tape to the start.
    pub fn rewind(&mut self) -> Result<u64, TapeError> {
        self.seek_input(0)
    }

    /// Scan the whole input tape for name blocks.
    ///
    /// Name blocks are listed even with a bad checksum (flagged). Other
    /// malformed blocks are skipped; with `aggressive` set, scanning resumes
    /// from just past the failed block's sync byte instead of after its
    /// body, recovering block starts that were misframed by noise.
    pub fn list_files(&mut self, aggressive: bool) -> Vec<TapeFileInfo> {
        let Some(input) = self.input.as_mut() else {
            return Vec::new();
        };
        let mut files = Vec::new();
        loop {
            let Ok(offset) = input.dec.sync_to_block() else {
                break;
            };
            let Ok(block) = input.dec.block_in() else {
                break;
            };
            match NameBlock::parse(&block) {
                Some(name) => files.push(TapeFileInfo {
                    name: name.name,
                    file_type: name.file_type,
                    ascii: name.ascii,
                    gapped: name.gapped,
                    load_addr: name.load_addr,
                    exec_addr: name.exec_addr,
                    fingerprint: name.fingerprint,
                    offset,
                    checksum_error: !block.checksum_ok(),
                }),
                None => {
                    if !block.checksum_ok() {
                        log::debug!("skipping malformed block at offset {offset}");
                        if aggressive && input.dec.tape_mut().seek(SeekFrom::Start(offset)).is_err()
                        {
                            break;
                        }
                    }
                }
            }
        }
        files
    }
}

/// Length in bytes of the first leader, or `None` if no sync byte exists.
fn measure_leader(dec: &mut Decoder<Box<dyn TapeInput>>) -> Option<u64> {
    let mut window = 0u8;
    let mut bits = 0u64;
    loop {
        window >>= 1;
        match dec.bit_in() {
            Ok(true) => window |= 0x80,
            Ok(false) => {}
            Err(_) => return None,
        }
        bits += 1;
        if window == SYNC_BYTE {
            return Some(bits.saturating_sub(8) / 8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use format_fsk::{KIND_DATA, KIND_NAME, MemoryTape};

    fn name_payload(name: &str, exec: u16, load: u16) -> Vec<u8> {
        let mut data = vec![b' '; 8];
        data[..name.len()].copy_from_slice(name.as_bytes());
        data.extend_from_slice(&[2, 0, 0xFF]);
        data.extend_from_slice(&exec.to_be_bytes());
        data.extend_from_slice(&load.to_be_bytes());
        data
    }

    fn boxed(tape: MemoryTape) -> Box<dyn TapeInput> {
        let mut tape = tape;
        tape.rewind();
        Box::new(tape)
    }

    fn deck_with(tape: MemoryTape, threshold: u32) -> TapeDeck {
        let mut deck = TapeDeck::new();
        deck.attach_input(boxed(tape), CellTiming::dragon(), threshold)
            .expect("attach");
        deck
    }

    #[test]
    fn leader_measurement_classifies_short_tapes() {
        let mut enc = Encoder::new(MemoryTape::new(), CellTiming::dragon());
        enc.leader(16).expect("leader");
        enc.sync().expect("sync");
        enc.block_out(KIND_NAME, &name_payload("A", 0, 0))
            .expect("block");
        let tape = enc.into_inner();

        let deck = deck_with(tape.clone(), 114);
        assert!(deck.short_leader());

        let deck = deck_with(tape, 10);
        assert!(!deck.short_leader());
    }

    #[test]
    fn list_files_reports_directory_entries() {
        let mut enc = Encoder::new(MemoryTape::new(), CellTiming::dragon());
        enc.leader(32).expect("leader");
        enc.sync().expect("sync");
        enc.block_out(KIND_NAME, &name_payload("GAME", 0x4000, 0x3000))
            .expect("name block");
        enc.leader(16).expect("leader");
        enc.sync().expect("sync");
        enc.block_out(KIND_DATA, &[1, 2, 3]).expect("data block");
        enc.leader(16).expect("leader");
        enc.sync().expect("sync");
        enc.block_out(KIND_NAME, &name_payload("SAVE", 0, 0x0600))
            .expect("name block");

        let mut deck = deck_with(enc.into_inner(), 114);
        let files = deck.list_files(false);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "GAME");
        assert_eq!(files[0].exec_addr, 0x4000);
        assert_eq!(files[0].load_addr, 0x3000);
        assert!(!files[0].checksum_error);
        assert_eq!(files[1].name, "SAVE");
    }

    #[test]
    fn listed_offset_re_reads_the_same_block() {
        let mut enc = Encoder::new(MemoryTape::new(), CellTiming::dragon());
        enc.leader(32).expect("leader");
        enc.sync().expect("sync");
        enc.block_out(KIND_NAME, &name_payload("HELLO", 0, 0))
            .expect("block");

        let mut deck = deck_with(enc.into_inner(), 114);
        let files = deck.list_files(false);
        assert_eq!(files.len(), 1);

        deck.seek_input(files[0].offset).expect("seek");
        let block = deck
            .input
            .as_mut()
            .expect("input")
            .dec
            .block_in()
            .expect("block");
        let name = NameBlock::parse(&block).expect("name block");
        assert_eq!(name.name, "HELLO");
        assert_eq!(name.fingerprint, files[0].fingerprint);
    }

    #[test]
    fn corrupt_name_block_is_flagged_not_dropped() {
        let payload = name_payload("BAD", 0, 0);
        let mut enc = Encoder::new(MemoryTape::new(), CellTiming::dragon());
        enc.leader(32).expect("leader");
        enc.sync().expect("sync");
        // Frame by hand with a wrong trailing sum.
        enc.byte_out(KIND_NAME).expect("kind");
        enc.byte_out(payload.len() as u8).expect("length");
        for &b in &payload {
            enc.byte_out(b).expect("data");
        }
        enc.byte_out(0x00).expect("bad sum");

        let mut deck = deck_with(enc.into_inner(), 114);
        let files = deck.list_files(false);
        assert_eq!(files.len(), 1);
        assert!(files[0].checksum_error);
    }

    #[test]
    fn detach_output_closes_the_rewrite() {
        let mut deck = TapeDeck::new();
        deck.attach_output(Box::new(MemoryTape::new()), CellTiming::dragon());
        let tape = deck
            .detach_output()
            .expect("detach")
            .expect("tape present");
        // Closing an idle rewriter still writes the trailing silence.
        assert_eq!(tape.tell(), 2);
        assert!(deck.detach_output().expect("detach").is_none());
    }
}
