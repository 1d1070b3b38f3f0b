#![cfg(feature = "trace")]

use apu_bridge::trace::write_slots_csv;
use apu_bridge::{
    parse_trace, Apu, ControlBits, EngineConfig, FlatMemory, MemorySink, Replayer, TraceOp,
};

fn replayer(memory: FlatMemory) -> Replayer<MemorySink, FlatMemory> {
    let apu = Apu::new(EngineConfig::ntsc(), MemorySink::new(), memory).unwrap();
    Replayer::new(apu)
}

#[test]
fn frame_irq_reported_to_trace_reads() {
    let events = parse_trace(
        "22400 read\n\
         22410 read\n\
         52300 read\n",
    )
    .unwrap();
    let mut replayer = replayer(FlatMemory::new());
    let summary = replayer.run(&events).clone();

    let values: Vec<u8> = summary.status_reads.iter().map(|r| r.value).collect();
    assert_eq!(values, [0x40, 0x00, 0x40]);
    assert_eq!(summary.status_reads[2].cycle, 52300);
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.rebased_cycles, 0);
}

#[test]
fn pulse_trace_exports_phase_reset_slot() {
    let events = parse_trace(
        "; pulse 0, constant volume 15\n\
         0 $4015 $01\n\
         0 $4000 $1F\n\
         0 $4002 $FD\n\
         0 $4003 $08\n",
    )
    .unwrap();
    let mut replayer = replayer(FlatMemory::new());
    replayer.run(&events);

    let apu = replayer.into_apu();
    let slots = apu.sink().slots();
    let first = &slots[0];
    assert_eq!(first.sample_index, 0);
    assert_eq!(first.words[0], 0x0FDF);
    assert_eq!(
        first.control,
        ControlBits::INC_READ | ControlBits::PULSE0_PHASE_RESET
    );

    let mut out = Vec::new();
    write_slots_csv(slots, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let row = text.lines().nth(1).unwrap();
    assert!(row.starts_with("1025,0,0FDF,"), "row {row}");
    assert!(row.ends_with(",3"), "row {row}");
}

#[test]
fn dmc_trace_reads_sample_memory() {
    let memory = FlatMemory::with_image(&[0xFF], 0xC000).unwrap();
    let events = parse_trace(
        "0 4010 8F\n\
         0 4012 00\n\
         0 4013 00\n\
         0 4015 10\n\
         1000 read\n",
    )
    .unwrap();
    let mut replayer = replayer(memory);
    let summary = replayer.run(&events).clone();

    assert_eq!(summary.status_reads[0].value & 0x90, 0x80);
    let apu = replayer.into_apu();
    assert!(!apu.sink().pcm_writes().is_empty());
    assert!(apu.dmc().level() > 0);
}

#[test]
fn long_trace_crosses_rebase_boundary() {
    let mut text = String::from("0 4015 01\n0 4000 1F\n0 4003 08\n");
    for i in 1..=120u64 {
        text.push_str(&format!("{} 4002 {:02X}\n", i * 29_781, (i * 2) & 0xFF));
    }
    let events = parse_trace(&text).unwrap();
    assert!(matches!(events[3].op, TraceOp::Write { register: 0x02, .. }));

    let mut replayer = replayer(FlatMemory::new());
    let summary = replayer.run(&events).clone();

    assert_eq!(summary.events, events.len());
    assert!(summary.frames >= 120);
    assert_eq!(summary.rebased_cycles, 1 << 21);
    let apu = replayer.into_apu();
    assert!(apu.sequencer().next_timestamp() < 1 << 21);
}
