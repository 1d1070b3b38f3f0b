use std::cell::RefCell;

use apu_bridge::channels::{NOISE, PULSE0, PULSE1, TRIANGLE};
use apu_bridge::{
    Apu, ControlBits, EngineConfig, FlatMemory, FrameClock, MemorySink, Region, StatusFlags,
};

fn ntsc() -> Apu<MemorySink, FlatMemory> {
    Apu::new(EngineConfig::ntsc(), MemorySink::new(), FlatMemory::new()).unwrap()
}

/// Timestamp of the k-th NTSC sequencer tick after power-on
fn tick(k: u32) -> u32 {
    (1 + k * 14915) >> 1
}

#[test]
fn pulse_scenario_commits_at_next_sample_boundary() {
    let mut apu = ntsc();
    apu.write(0, 0x15, 0x01);
    apu.write(0, 0x00, 0x0F);
    apu.write(10, 0x02, 0x00);
    apu.write(10, 0x03, 0x08);

    assert_eq!(apu.length_counter(PULSE0), 0xFE);
    assert!(apu.envelope(0).reload_pending());
    assert!(apu.status().contains(StatusFlags::PULSE0));
    // Period 0, volume still 0 until the envelope restarts
    assert_eq!(apu.fifo().cache()[PULSE0], 0x0000);
    assert!(apu.sink().slots().is_empty());

    // Timestamp 41 is the first one in sample 1
    apu.force_update(40);
    assert!(apu.sink().slots().is_empty());
    apu.force_update(41);
    let slots = apu.sink().slots();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].sample_index, 0);
    assert_eq!(slots[0].cursor, 1025);
    assert!(slots[0]
        .control
        .contains(ControlBits::INC_READ | ControlBits::PULSE0_PHASE_RESET));

    // The next sequencer tick restarts the envelope at volume 15
    apu.force_update(tick(1));
    assert_eq!(apu.fifo().cache()[PULSE0], 0x000F);
    // Period under 8 is muted in the committed word
    assert_eq!(apu.fifo().pending()[PULSE0], 0);
}

#[test]
fn audible_pulse_reaches_committed_word() {
    let mut apu = ntsc();
    apu.write(0, 0x15, 0x01);
    apu.write(0, 0x00, 0x1F);
    apu.write(0, 0x02, 0xFD);
    apu.write(0, 0x03, 0x08);
    apu.force_update(100);

    let slot = apu.sink().last_slot().unwrap();
    assert_eq!(slot.sample_index, 0);
    assert_eq!(slot.words[0], 0x0FDF);
    assert_eq!(slot.words[1], 0);
}

#[test]
fn writes_within_one_sample_coalesce() {
    let mut apu = ntsc();
    apu.write(0, 0x15, 0x01);
    apu.write(0, 0x00, 0x1F);
    apu.write(0, 0x03, 0x00);

    apu.write(50, 0x02, 0x80);
    apu.write(60, 0x02, 0x90);
    apu.force_update(200);

    let slots = apu.sink().slots();
    let sample_one: Vec<_> = slots.iter().filter(|s| s.sample_index == 1).collect();
    assert_eq!(sample_one.len(), 1);
    assert_eq!(sample_one[0].words[0], 0x090F);
    assert!(slots.iter().all(|s| s.words[0] != 0x080F));
}

#[test]
fn short_periods_are_muted() {
    let mut apu = ntsc();
    apu.write(0, 0x15, 0x03);
    apu.write(0, 0x00, 0x1F);
    apu.write(0, 0x02, 0x07);
    apu.write(0, 0x03, 0x08);
    apu.write(0, 0x04, 0x1F);
    apu.write(0, 0x05, 0x81);
    apu.write(0, 0x06, 0x07);
    apu.write(0, 0x07, 0x08);
    apu.force_update(100);

    assert_eq!(apu.fifo().cache()[PULSE0], 0x007F);
    let slot = apu.sink().last_slot().unwrap();
    assert_eq!(slot.words[0], 0);
    assert_eq!(slot.words[1], 0);
}

#[test]
fn length_loads_require_enable() {
    let mut apu = ntsc();
    apu.write(0, 0x03, 0x08);
    apu.write(0, 0x07, 0x08);
    apu.write(0, 0x0B, 0x08);
    apu.write(0, 0x0F, 0x08);
    for channel in [PULSE0, PULSE1, TRIANGLE, NOISE] {
        assert_eq!(apu.length_counter(channel), 0);
    }
    assert_eq!(apu.status(), StatusFlags::empty());

    apu.write(1, 0x15, 0x0F);
    apu.write(1, 0x0F, 0x18);
    assert_eq!(apu.length_counter(NOISE), 0x02);
    assert!(apu.status().contains(StatusFlags::NOISE));
}

#[test]
fn envelope_decays_once_per_tick_at_period_zero() {
    let mut apu = ntsc();
    apu.write(0, 0x15, 0x01);
    apu.write(0, 0x00, 0x00);
    apu.write(0, 0x03, 0x08);

    apu.force_update(tick(1));
    assert_eq!(apu.envelope(0).level(), 15);
    for k in 2..=16 {
        apu.force_update(tick(k));
        assert_eq!(apu.envelope(0).level() as u32, 16 - k);
        assert_eq!(apu.fifo().cache()[PULSE0] & 0x0F, 16 - k);
    }
    apu.force_update(tick(20));
    assert_eq!(apu.envelope(0).level(), 0);
}

#[test]
fn looping_envelope_wraps() {
    let mut apu = ntsc();
    apu.write(0, 0x15, 0x01);
    apu.write(0, 0x00, 0x20);
    apu.write(0, 0x03, 0x08);

    apu.force_update(tick(16));
    assert_eq!(apu.envelope(0).level(), 0);
    apu.force_update(tick(17));
    assert_eq!(apu.envelope(0).level(), 15);
    // Loop also halts the length counter
    assert_eq!(apu.length_counter(PULSE0), 0xFE);
}

#[test]
fn length_counter_expiry_clears_status() {
    let mut apu = ntsc();
    apu.write(0, 0x15, 0x01);
    // Length index 3 loads 2
    apu.write(0, 0x03, 0x18);
    assert_eq!(apu.length_counter(PULSE0), 2);

    // Half-frame ticks are the even steps: ticks 2 and 4
    apu.force_update(tick(2));
    assert_eq!(apu.length_counter(PULSE0), 1);
    apu.force_update(tick(4));
    assert_eq!(apu.length_counter(PULSE0), 0);
    assert!(!apu.status().contains(StatusFlags::PULSE0));
}

#[test]
fn four_step_sequencer_raises_irq_once_per_cycle() {
    let mut apu = ntsc();
    let mut raised = Vec::new();
    for k in 0..16 {
        if apu.read_status(tick(k)) & 0x40 != 0 {
            raised.push(k);
        }
    }
    assert_eq!(raised, [3, 7, 11, 15]);
}

#[test]
fn inhibited_and_five_step_sequencers_never_raise_irq() {
    for value in [0x40, 0x80, 0xC0] {
        let mut apu = ntsc();
        apu.write(0, 0x17, value);
        for ts in (0..400_000).step_by(997) {
            assert_eq!(apu.read_status(ts) & 0x40, 0, "mode {value:02X} at {ts}");
        }
    }
}

#[test]
fn frame_irq_survives_status_write() {
    let mut apu = ntsc();
    apu.force_update(tick(3));
    assert!(apu.status().contains(StatusFlags::FRAME_IRQ));
    apu.write(tick(3), 0x15, 0x00);
    assert!(apu.status().contains(StatusFlags::FRAME_IRQ));
}

#[test]
fn triangle_update_lands_after_delay() {
    let mut apu = ntsc();
    apu.write(0, 0x15, 0x04);
    apu.write(0, 0x08, 0x7F);
    apu.write(0, 0x0A, 0x20);
    apu.write(0, 0x0B, 0x09);
    assert_eq!(apu.fifo().cache()[2] & !0x0F, 0);

    // Delay lands at 100 but the linear counter is still zero
    apu.force_update(200);
    assert_eq!(apu.fifo().cache()[2] & !0x0F, 0);

    // The first tick reloads the linear counter and re-arms the delay
    apu.force_update(tick(1));
    assert_eq!(apu.triangle().linear(), 0x7F);
    assert_eq!(apu.fifo().cache()[2] & !0x0F, 0);
    apu.force_update(tick(1) + 100);
    assert_eq!(apu.fifo().cache()[2] & !0x0F, 0x120 << 4);
}

#[test]
fn triangle_silenced_when_disabled() {
    let mut apu = ntsc();
    apu.write(0, 0x15, 0x04);
    apu.write(0, 0x08, 0x7F);
    apu.write(0, 0x0A, 0x20);
    apu.write(0, 0x0B, 0x09);
    apu.force_update(tick(1) + 200);
    assert_ne!(apu.fifo().cache()[2] & !0x0F, 0);

    let ts = tick(1) + 300;
    apu.write(ts, 0x15, 0x00);
    apu.force_update(ts + 99);
    assert_ne!(apu.fifo().cache()[2] & !0x0F, 0);
    apu.force_update(ts + 100);
    assert_eq!(apu.fifo().cache()[2] & !0x0F, 0);
}

#[test]
fn noise_volume_muted_while_inactive() {
    let mut apu = ntsc();
    apu.write(0, 0x0C, 0x3A);
    apu.write(0, 0x0E, 0x03);
    apu.force_update(100);
    let slot = apu.sink().last_slot().unwrap();
    assert_eq!(slot.words[2] & 0x0F, 0);
    assert_eq!(apu.fifo().cache()[2] & 0x0F, 0x0A);

    apu.write(100, 0x15, 0x08);
    apu.write(100, 0x0F, 0x08);
    apu.force_update(200);
    let slot = apu.sink().last_slot().unwrap();
    assert_eq!(slot.words[2] & 0x0F, 0x0A);
    assert_eq!((slot.words[3] >> 8) & 0x0F, 0x03);
}

#[test]
fn dmc_address_wraps_to_upper_half() {
    let reads = RefCell::new(Vec::new());
    let memory = |addr: u16| -> u8 {
        reads.borrow_mut().push(addr);
        0x55
    };
    let mut apu = Apu::new(EngineConfig::ntsc(), MemorySink::new(), memory).unwrap();
    apu.write(0, 0x10, 0x0F);
    apu.write(0, 0x12, 0xFF);
    apu.write(0, 0x13, 0x04);
    apu.write(0, 0x15, 0x10);
    assert!(apu.status().contains(StatusFlags::DMC));

    apu.force_update(40_000);
    let reads = reads.borrow();
    assert_eq!(reads.len(), 65);
    assert_eq!(reads[0], 0xFFC0);
    assert_eq!(reads[63], 0xFFFF);
    assert_eq!(reads[64], 0x8000);
    assert!(!apu.status().contains(StatusFlags::DMC));
}

#[test]
fn dmc_irq_visible_through_status_read() {
    let mut apu = ntsc();
    apu.write(0, 0x17, 0x40);
    apu.write(0, 0x10, 0x8F);
    apu.write(0, 0x15, 0x10);
    let end = apu.dmc().end_timestamp().unwrap();

    assert_eq!(apu.read_status(end - 1) & 0x90, 0x10);
    assert_eq!(apu.read_status(end) & 0x90, 0x80);
    // Rate write with loop set clears the interrupt
    apu.write(end + 1, 0x10, 0xCF);
    assert_eq!(apu.read_status(end + 1) & 0x80, 0);
}

#[test]
fn looping_sample_parks_once_disabled() {
    let mut apu = ntsc();
    apu.write(0, 0x10, 0xCF); // IRQ, loop, period 54
    apu.write(0, 0x12, 0x01); // $C040
    apu.write(0, 0x13, 0x01); // 17 bytes
    apu.write(0, 0x15, 0x10);
    assert_eq!(apu.dmc().next_timestamp(), Some(27));
    assert_eq!(apu.dmc().end_timestamp(), Some(27 + 128 * 54));

    // Third byte fetched at 891, five of its bits still pending
    apu.write(1_000, 0x15, 0x00);
    assert_eq!(apu.dmc().address(), 0xC043);
    assert_eq!(apu.dmc().bytes_remaining(), 0);
    assert_eq!(apu.dmc().next_timestamp(), Some(1_053));
    assert_eq!(apu.dmc().end_timestamp(), None);

    apu.force_update(20_000);
    assert_eq!(apu.dmc().next_timestamp(), None);
    assert_eq!(apu.dmc().end_timestamp(), None);
    assert_eq!(apu.dmc().address(), 0xC043);
    assert_eq!(apu.read_status(20_000) & 0x90, 0);

    // Re-enabling reloads from the address and length registers
    apu.write(30_000, 0x15, 0x10);
    assert_eq!(apu.dmc().address(), 0xC040);
    assert_eq!(apu.dmc().bytes_remaining(), 17);
    assert_eq!(apu.dmc().next_timestamp(), Some(30_027));
    assert_eq!(apu.dmc().end_timestamp(), Some(30_027 + 128 * 54));
    assert!(apu.status().contains(StatusFlags::DMC));
}

#[test]
fn dmc_stream_produces_pcm_deltas() {
    let mut memory = FlatMemory::new();
    memory.poke(0xC000, 0xFF);
    let mut apu = Apu::new(EngineConfig::ntsc(), MemorySink::new(), memory).unwrap();
    apu.write(0, 0x11, 0x40);
    apu.write(0, 0x10, 0x00);
    apu.write(0, 0x15, 0x10);
    apu.force_update(8 * 428 + 214);

    assert_eq!(apu.dmc().level(), 0x40 + 16);
    let net: i32 = apu
        .sink()
        .pcm_buffer()
        .iter()
        .map(|&d| -(d as i8 as i32))
        .sum();
    assert_eq!(net, 0x40 + 16);
}

#[test]
fn direct_level_writes_coalesce_per_sample() {
    let mut apu = ntsc();
    apu.write(0, 0x11, 0x10);
    apu.write(5, 0x11, 0x30);
    assert_eq!(apu.sink().pcm_buffer()[0], 0x30u8.wrapping_neg());
    apu.write(100, 0x11, 0x20);
    assert_eq!(apu.sink().pcm_buffer()[2], 0x10);
}

#[test]
fn unmapped_writes_are_ignored() {
    let mut apu = ntsc();
    for register in [0x09, 0x0D, 0x14, 0x16, 0x18, 0x1F] {
        apu.write(0, register, 0xFF);
    }
    assert_eq!(apu.status(), StatusFlags::empty());
    assert_eq!(*apu.fifo().cache(), [0; 4]);
}

#[derive(Clone, Copy)]
enum Access {
    Write(u16, u8),
    Read,
}

fn frame_accesses(frame: u32) -> Vec<(u32, Access)> {
    let mut accesses = vec![
        (100, Access::Write(0x02, (frame * 7) as u8)),
        (2_000, Access::Write(0x0E, if frame % 2 == 0 { 0x84 } else { 0x04 })),
        (9_000, Access::Write(0x11, ((frame * 3) & 0x7F) as u8)),
        (12_000, Access::Read),
    ];
    if frame % 5 == 0 {
        accesses.push((5_000, Access::Write(0x03, 0x08 | (frame % 3) as u8)));
        accesses.push((5_000, Access::Write(0x0B, 0x09)));
    }
    accesses.sort_by_key(|&(offset, _)| offset);
    accesses
}

fn setup(apu: &mut Apu<MemorySink, FlatMemory>) {
    for (register, value) in [
        (0x15, 0x1F),
        (0x00, 0xBF),
        (0x01, 0x99),
        (0x02, 0xFD),
        (0x03, 0x08),
        (0x04, 0x5F),
        (0x05, 0xA2),
        (0x06, 0x40),
        (0x07, 0x08),
        (0x08, 0x7F),
        (0x0A, 0x20),
        (0x0B, 0x09),
        (0x0C, 0x3F),
        (0x0E, 0x84),
        (0x0F, 0x08),
        (0x10, 0x4E),
        (0x12, 0x00),
        (0x13, 0x01),
        (0x15, 0x1F),
    ] {
        apu.write(0, register, value);
    }
}

fn pattern_memory() -> FlatMemory {
    let image: Vec<u8> = (0..=255u8).map(|b| b.wrapping_mul(37)).collect();
    FlatMemory::with_image(&image, 0xC000).unwrap()
}

#[test]
fn rebase_is_transparent() {
    let config = EngineConfig::ntsc();
    let mut rebased = Apu::new(config, MemorySink::new(), pattern_memory()).unwrap();
    let mut reference = Apu::new(config, MemorySink::new(), pattern_memory()).unwrap();
    setup(&mut rebased);
    setup(&mut reference);

    let mut clock = FrameClock::new(Region::Ntsc);
    let mut local = 0u32;
    let mut absolute = 0u32;
    let mut total_adjustment = 0u32;
    let mut rebased_reads = Vec::new();
    let mut reference_reads = Vec::new();

    for frame in 0..240 {
        let [first, second] = clock.next_frame();
        for (offset, access) in frame_accesses(frame) {
            match access {
                Access::Write(register, value) => {
                    rebased.write(local + offset, register, value);
                    reference.write(absolute + offset, register, value);
                }
                Access::Read => {
                    rebased_reads.push(rebased.read_status(local + offset));
                    reference_reads.push(reference.read_status(absolute + offset));
                }
            }
        }
        local += first;
        absolute += first;
        rebased.force_update(local);
        reference.force_update(absolute);

        local += second;
        absolute += second;
        let adjustment = rebased.end_of_frame(local);
        reference.force_update(absolute);
        local -= adjustment;
        total_adjustment += adjustment;
    }

    assert!(total_adjustment >= 2 << 21);
    assert_eq!(absolute - local, total_adjustment);
    assert_eq!(rebased_reads, reference_reads);
    assert_eq!(rebased.sink().slots(), reference.sink().slots());
    assert_eq!(rebased.sink().pcm_writes(), reference.sink().pcm_writes());
    assert_eq!(
        rebased.sequencer().next_timestamp() + total_adjustment,
        reference.sequencer().next_timestamp()
    );
    assert_eq!(rebased.status(), reference.status());
}

#[test]
fn pal_region_uses_pal_tables() {
    let mut apu = Apu::new(EngineConfig::pal(), MemorySink::new(), FlatMemory::new()).unwrap();
    assert_eq!(apu.bridge().scale(), 55626);
    apu.write(0, 0x10, 0x00);
    assert_eq!(apu.dmc().period(), 0x18E);
    apu.read_status(0);
    assert_eq!(apu.sequencer().next_timestamp(), (1 + 16627) >> 1);
}
