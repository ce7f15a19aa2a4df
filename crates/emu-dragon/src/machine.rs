//! Cassette machine wiring: deck, registers, scheduler and breakpoints.
//!
//! [`CassetteMachine`] owns the event queue and the breakpoint session and
//! hands both (by handle) to the subsystems that need them. The shared
//! mutable state lives in [`TapeCore`], the context every scheduled event
//! and breakpoint handler receives.

use std::rc::Rc;

use emu_core::{BreakpointSession, Bus, EventQueue, Handler, Tickable, Ticks};
use format_fsk::{SYNC_BYTE, TapeError, TapeInput, TapeOutput};

use crate::config::{MachineConfig, MachineVariant};
use crate::fastload::{BitSample, ShadowEngine};
use crate::registers::{LoaderRegs, Mc6801Regs, Mc6809Regs};
use crate::tape::{TapeDeck, TapeFileInfo};

/// Machine state shared with event and breakpoint handlers.
pub struct TapeCore {
    pub deck: TapeDeck,
    pub regs: Box<dyn LoaderRegs>,
    pub bus: Box<dyn Bus>,
    pub config: MachineConfig,
    scheduler: EventQueue<TapeCore>,
    /// Virtual time consumed by shadow routines but not yet applied to the
    /// scheduler. Drained after breakpoint dispatch returns; advancing the
    /// queue from inside a handler would reenter it.
    pending_skip: u64,
    /// Sync-byte hunt window over shadow-served bits, for the rewriter.
    rewrite_window: u8,
    rewriting: bool,
    /// While set, the shadow routines are the only pulse consumer and
    /// playback stays parked.
    fast_loading: bool,
}

impl TapeCore {
    /// Turn the cassette motor relay on or off.
    pub fn set_motor(&mut self, on: bool) {
        if self.deck.motor == on {
            return;
        }
        self.deck.motor = on;
        if on {
            if self.rewriting {
                if let Some(out) = self.deck.output.as_mut() {
                    if let Err(err) = out.rewrite.motor_on(&mut out.enc) {
                        log::warn!("rewrite motor-on failed: {err}");
                    }
                }
            }
            self.start_playback();
        } else {
            if let Some(out) = self.deck.output.as_mut() {
                if let Err(err) = out.rewrite.desync(&mut out.enc) {
                    log::warn!("rewrite desync failed: {err}");
                }
            }
            self.stop_playback();
        }
    }

    fn start_playback(&mut self) {
        if self.fast_loading || self.deck.playback.is_some() || !self.deck.has_input() {
            return;
        }
        self.deck.no_signal = false;
        self.playback_step();
    }

    fn stop_playback(&mut self) {
        if let Some(id) = self.deck.playback.take() {
            self.scheduler.cancel(id);
        }
    }

    /// Deliver one pulse to the input line and arm the next delivery for
    /// when this pulse ends.
    fn playback_step(&mut self) {
        if !self.deck.motor {
            return;
        }
        let Some(input) = self.deck.input.as_mut() else {
            return;
        };
        match input.dec.pulse_in() {
            Ok(pulse) => {
                self.deck.level = pulse.level;
                let id = self.scheduler.schedule_after(
                    Ticks::new(u64::from(pulse.duration)),
                    Rc::new(|core: &mut TapeCore| {
                        core.deck.playback = None;
                        core.playback_step();
                    }),
                );
                self.deck.playback = Some(id);
            }
            Err(err) => self.signal_lost(&err),
        }
    }

    fn signal_lost(&mut self, err: &TapeError) {
        log::debug!("tape signal lost: {err}");
        self.deck.no_signal = true;
        self.stop_playback();
    }

    /// Feed shadow-decoded bits to the rewriter: while desynced they train
    /// the width estimate and drive the sync-byte hunt; once synced they
    /// are re-emitted as block bits.
    fn feed_rewrite(&mut self, samples: &[BitSample]) {
        if !self.rewriting {
            return;
        }
        let Some(out) = self.deck.output.as_mut() else {
            return;
        };
        for sample in samples {
            let result = if out.rewrite.is_synced() {
                out.rewrite.bit(&mut out.enc, sample.bit)
            } else {
                out.rewrite.observe(sample.first, sample.second);
                self.rewrite_window >>= 1;
                if sample.bit {
                    self.rewrite_window |= 0x80;
                }
                if self.rewrite_window == SYNC_BYTE {
                    self.rewrite_window = 0;
                    out.rewrite.sync_observed(&mut out.enc)
                } else {
                    Ok(())
                }
            };
            if let Err(err) = result {
                log::warn!("rewrite output failed: {err}");
                return;
            }
        }
    }

    /// Simulate the shadowed routine's RTS.
    fn finish_routine(&mut self) {
        self.regs.return_from_sub(&mut *self.bus);
    }

    fn shadow_motor_on(&mut self) {
        self.set_motor(true);
        let Some(input) = self.deck.input.as_mut() else {
            return;
        };
        let short = input.short_leader;
        let mut engine = ShadowEngine::new(&mut input.dec, &mut *self.regs, short);
        let result = engine.motor_on();
        let elapsed = engine.elapsed();
        self.pending_skip += elapsed;
        match result {
            Ok(()) => self.finish_routine(),
            Err(err) => self.signal_lost(&err),
        }
    }

    fn shadow_sync_leader(&mut self) {
        let Some(input) = self.deck.input.as_mut() else {
            return;
        };
        let short = input.short_leader;
        let mut engine = ShadowEngine::new(&mut input.dec, &mut *self.regs, short);
        let result = engine.sync_leader();
        let elapsed = engine.elapsed();
        let samples = engine.take_samples();
        self.pending_skip += elapsed;
        self.feed_rewrite(&samples);
        match result {
            Ok(phase) => {
                log::trace!("leader locked, phase {phase:?}");
                self.finish_routine();
            }
            Err(err) => self.signal_lost(&err),
        }
    }

    fn shadow_bit_in(&mut self) {
        let Some(input) = self.deck.input.as_mut() else {
            return;
        };
        let short = input.short_leader;
        let mut engine = ShadowEngine::new(&mut input.dec, &mut *self.regs, short);
        let result = engine.bit_in();
        let elapsed = engine.elapsed();
        let samples = engine.take_samples();
        self.pending_skip += elapsed;
        self.feed_rewrite(&samples);
        match result {
            Ok(_) => self.finish_routine(),
            Err(err) => self.signal_lost(&err),
        }
    }

    fn shadow_byte_in(&mut self) {
        let Some(input) = self.deck.input.as_mut() else {
            return;
        };
        let short = input.short_leader;
        let mut engine = ShadowEngine::new(&mut input.dec, &mut *self.regs, short);
        let result = engine.byte_in();
        let elapsed = engine.elapsed();
        let samples = engine.take_samples();
        self.pending_skip += elapsed;
        self.feed_rewrite(&samples);
        match result {
            Ok(_) => self.finish_routine(),
            Err(err) => self.signal_lost(&err),
        }
    }

    fn rewrite_block_end(&mut self) {
        self.rewrite_window = 0;
        if !self.rewriting {
            return;
        }
        if let Some(out) = self.deck.output.as_mut() {
            if let Err(err) = out.rewrite.end_of_block(&mut out.enc) {
                log::warn!("rewrite block end failed: {err}");
            }
        }
    }
}

/// The cassette subsystem of one emulated machine.
pub struct CassetteMachine {
    scheduler: EventQueue<TapeCore>,
    breakpoints: BreakpointSession<TapeCore>,
    core: TapeCore,
    /// Installed fast-loading hooks, kept for removal.
    fastload_hooks: Vec<(u16, Handler<TapeCore>)>,
    rewrite_hook: Option<(u16, Handler<TapeCore>)>,
}

impl CassetteMachine {
    #[must_use]
    pub fn new(config: MachineConfig, bus: Box<dyn Bus>) -> Self {
        let scheduler: EventQueue<TapeCore> = EventQueue::new();
        let breakpoints: BreakpointSession<TapeCore> = BreakpointSession::new();
        let regs: Box<dyn LoaderRegs> = match config.variant {
            MachineVariant::Dragon64 => Box::new(Mc6809Regs::default()),
            MachineVariant::Mc10 => Box::new(Mc6801Regs::default()),
        };
        Self {
            core: TapeCore {
                deck: TapeDeck::new(),
                regs,
                bus,
                config,
                scheduler: scheduler.clone(),
                pending_skip: 0,
                rewrite_window: 0,
                rewriting: false,
                fast_loading: false,
            },
            scheduler,
            breakpoints,
            fastload_hooks: Vec::new(),
            rewrite_hook: None,
        }
    }

    #[must_use]
    pub fn core(&self) -> &TapeCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut TapeCore {
        &mut self.core
    }

    #[must_use]
    pub fn deck(&self) -> &TapeDeck {
        &self.core.deck
    }

    #[must_use]
    pub fn now(&self) -> Ticks {
        self.scheduler.now()
    }

    /// Attach an input tape; playback starts immediately if the motor is
    /// already on.
    pub fn attach_input(&mut self, tape: Box<dyn TapeInput>) -> Result<(), TapeError> {
        self.detach_input();
        self.core.deck.attach_input(
            tape,
            self.core.config.timing,
            self.core.config.short_leader_threshold,
        )?;
        if self.core.deck.motor() {
            self.core.start_playback();
        }
        Ok(())
    }

    pub fn detach_input(&mut self) -> Option<Box<dyn TapeInput>> {
        self.core.stop_playback();
        self.core.deck.detach_input()
    }

    pub fn attach_output(&mut self, tape: Box<dyn TapeOutput>) {
        self.core
            .deck
            .attach_output(tape, self.core.config.timing);
        self.core.rewrite_window = 0;
    }

    /// Detach the output tape, closing out any rewrite in progress.
    pub fn detach_output(&mut self) -> Result<Option<Box<dyn TapeOutput>>, TapeError> {
        self.core.deck.detach_output()
    }

    pub fn set_motor(&mut self, on: bool) {
        self.core.set_motor(on);
    }

    /// Reposition the input tape, restarting playback from the new offset
    /// if the motor is running.
    pub fn seek_input(&mut self, offset: u64) -> Result<u64, TapeError> {
        self.core.stop_playback();
        let pos = self.core.deck.seek_input(offset)?;
        if self.core.deck.motor() {
            self.core.start_playback();
        }
        Ok(pos)
    }

    /// Scan the input tape for directory entries, then rewind.
    pub fn list_files(&mut self, aggressive: bool) -> Vec<TapeFileInfo> {
        let files = self.core.deck.list_files(aggressive);
        if self.core.deck.has_input() {
            if let Err(err) = self.seek_input(0) {
                log::warn!("rewind after listing failed: {err}");
            }
        }
        files
    }

    #[must_use]
    pub fn fast_loading(&self) -> bool {
        self.core.fast_loading
    }

    /// Enable or disable fast loading: breakpoints on the firmware tape
    /// routines that shadow their effect directly from the pulse stream.
    /// Normal playback is parked while enabled; the shadow routines must be
    /// the only pulse consumer.
    pub fn set_fast_loading(&mut self, on: bool) {
        if on == self.core.fast_loading {
            return;
        }
        self.core.fast_loading = on;
        if on {
            self.core.stop_playback();
            let hooks = self.core.config.hooks;
            self.install_hook(hooks.motor_on, Rc::new(TapeCore::shadow_motor_on));
            self.install_hook(hooks.sync_leader, Rc::new(TapeCore::shadow_sync_leader));
            self.install_hook(hooks.bit_in, Rc::new(TapeCore::shadow_bit_in));
            self.install_hook(hooks.byte_in, Rc::new(TapeCore::shadow_byte_in));
        } else {
            for (address, handler) in self.fastload_hooks.drain(..) {
                self.breakpoints.remove_exec(address, address, &handler);
            }
            if self.core.deck.motor() {
                self.core.start_playback();
            }
        }
    }

    #[must_use]
    pub fn rewriting(&self) -> bool {
        self.core.rewriting
    }

    /// Enable or disable tape rewriting. Disabling closes out any block in
    /// progress on the output.
    pub fn set_rewriting(&mut self, on: bool) {
        if on == self.core.rewriting {
            return;
        }
        self.core.rewriting = on;
        self.core.rewrite_window = 0;
        if on {
            let address = self.core.config.hooks.block_end;
            let handler: Handler<TapeCore> = Rc::new(TapeCore::rewrite_block_end);
            self.breakpoints
                .add_exec(address, address, Rc::clone(&handler));
            self.rewrite_hook = Some((address, handler));
        } else {
            if let Some((address, handler)) = self.rewrite_hook.take() {
                self.breakpoints.remove_exec(address, address, &handler);
            }
            if let Some(out) = self.core.deck.output.as_mut() {
                if let Err(err) = out.rewrite.desync(&mut out.enc) {
                    log::warn!("rewrite desync failed: {err}");
                }
            }
        }
    }

    fn install_hook(&mut self, address: u16, handler: Handler<TapeCore>) {
        self.breakpoints
            .add_exec(address, address, Rc::clone(&handler));
        self.fastload_hooks.push((address, handler));
    }

    /// Dispatch instruction breakpoints for the current fetch, then apply
    /// any virtual time the shadow routines consumed.
    ///
    /// A handler that moves the program counter (completing a shadowed
    /// routine's RTS) may land on another hooked address, so dispatch
    /// repeats while the program counter changes. Firmware spin loops
    /// re-fetching the same address fire only once per fetch.
    pub fn check_instruction(&mut self) {
        loop {
            let pc = self.core.regs.pc();
            self.breakpoints.fire_exec(pc, &mut self.core);
            let skip = std::mem::take(&mut self.core.pending_skip);
            if skip > 0 {
                self.scheduler.advance(Ticks::new(skip), &mut self.core);
            }
            if self.core.regs.pc() == pc {
                break;
            }
        }
    }

    /// Read emulated memory, firing read watchpoints.
    pub fn read_memory(&mut self, address: u16) -> u8 {
        let value = self.core.bus.read(address);
        self.breakpoints.fire_read(address, &mut self.core);
        value
    }

    /// Write emulated memory, firing write watchpoints.
    pub fn write_memory(&mut self, address: u16, value: u8) {
        self.core.bus.write(address, value);
        self.breakpoints.fire_write(address, &mut self.core);
    }

    /// The breakpoint session, for front ends that add their own triggers.
    #[must_use]
    pub fn breakpoints(&self) -> &BreakpointSession<TapeCore> {
        &self.breakpoints
    }
}

impl Tickable for CassetteMachine {
    fn tick(&mut self) {
        self.scheduler.advance(Ticks::new(1), &mut self.core);
    }

    fn tick_n(&mut self, count: Ticks) {
        self.scheduler.advance(count, &mut self.core);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::FlatBus;
    use format_fsk::{CellTiming, Encoder, MemoryTape};

    fn machine() -> CassetteMachine {
        CassetteMachine::new(MachineConfig::dragon64(), Box::new(FlatBus::new()))
    }

    /// Park the CPU at `routine` with a return address of $1234 stacked.
    fn call_routine(m: &mut CassetteMachine, routine: u16) {
        m.core.bus.write(0x7FFE, 0x12);
        m.core.bus.write(0x7FFF, 0x34);
        let regs = m.core.regs.as_mut();
        regs.set_pc(routine);
        regs.set_sp(0x7FFE);
    }

    #[test]
    fn motor_toggle_starts_and_stops_playback() {
        let mut m = machine();
        let mut enc = Encoder::new(MemoryTape::new(), CellTiming::dragon());
        enc.leader(4).expect("leader");
        let mut tape = enc.into_inner();
        tape.rewind();
        m.attach_input(Box::new(tape)).expect("attach");

        assert_eq!(m.scheduler.pending(), 0);
        m.set_motor(true);
        assert_eq!(m.scheduler.pending(), 1);
        m.set_motor(false);
        assert_eq!(m.scheduler.pending(), 0);
    }

    #[test]
    fn playback_self_schedules_until_the_tape_ends() {
        let mut m = machine();
        let mut enc = Encoder::new(MemoryTape::new(), CellTiming::dragon());
        enc.byte_out(0x55).expect("byte");
        let mut tape = enc.into_inner();
        tape.rewind();
        m.attach_input(Box::new(tape)).expect("attach");
        m.set_motor(true);

        // One byte is 16 pulses; run well past it.
        m.tick_n(Ticks::new(u64::from(CellTiming::dragon().bit0_cell) * 20));
        assert!(m.deck().no_signal());
        assert_eq!(m.scheduler.pending(), 0);
    }

    #[test]
    fn fast_loading_installs_and_removes_hooks() {
        let mut m = machine();
        m.set_fast_loading(true);
        assert_eq!(m.breakpoints.exec_count(), 4);
        // Idempotent.
        m.set_fast_loading(true);
        assert_eq!(m.breakpoints.exec_count(), 4);
        m.set_fast_loading(false);
        assert_eq!(m.breakpoints.exec_count(), 0);
    }

    #[test]
    fn shadowed_byte_read_returns_to_the_caller() {
        let mut m = machine();
        let mut enc = Encoder::new(MemoryTape::new(), CellTiming::dragon());
        enc.byte_out(0xA5).expect("byte");
        let mut tape = enc.into_inner();
        tape.rewind();
        m.attach_input(Box::new(tape)).expect("attach");
        m.set_fast_loading(true);
        m.set_motor(true);

        let byte_in = m.core.config.hooks.byte_in;
        call_routine(&mut m, byte_in);
        m.check_instruction();

        // The shadow decoded the byte, simulated the RTS, and applied the
        // consumed tape time to the scheduler.
        assert_eq!(m.core.regs.a(), 0xA5);
        assert_eq!(m.core.regs.pc(), 0x1234);
        assert!(m.now().get() > 0);
        assert_eq!(m.core.pending_skip, 0);
    }

    #[test]
    fn signal_loss_leaves_the_firmware_routine_to_run() {
        let mut m = machine();
        let tape = MemoryTape::new();
        m.attach_input(Box::new(tape)).expect("attach");
        m.set_fast_loading(true);
        m.set_motor(true);

        let byte_in = m.core.config.hooks.byte_in;
        call_routine(&mut m, byte_in);
        m.check_instruction();

        // No pulses: the shadow aborts without the RTS and flags the loss.
        assert_eq!(m.core.regs.pc(), byte_in);
        assert!(m.deck().no_signal());
    }

    #[test]
    fn unhooked_fetch_fires_nothing() {
        let mut m = machine();
        m.set_fast_loading(true);
        call_routine(&mut m, 0x1000);
        m.check_instruction();
        assert_eq!(m.core.regs.pc(), 0x1000);
        assert_eq!(m.core.pending_skip, 0);
    }

    #[test]
    fn watchpoints_fire_on_memory_access() {
        use std::cell::Cell;

        let mut m = machine();
        let hits = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&hits);
        m.breakpoints.add_write_range(
            0x0600,
            4,
            Some(Rc::new(move |_core: &mut TapeCore| {
                counter.set(counter.get() + 1);
            })),
        );
        m.write_memory(0x0600, 1);
        m.write_memory(0x0603, 2);
        m.write_memory(0x0604, 3);
        assert_eq!(hits.get(), 2);
        assert_eq!(m.read_memory(0x0600), 1);
    }
}
