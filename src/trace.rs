//! Register trace replay
//!
//! A trace is a text file of timestamped APU accesses, one per line:
//!
//! ```text
//! # cycle  register  value
//! 0        $4015     $0F
//! 10       4000      = 3F
//! 29781    read
//! ```
//!
//! Cycles are absolute CPU cycles since power-on and must not decrease.
//! Registers are accepted either as bus addresses (`$4000`-`$4017`) or as
//! offsets (`00`-`17`). `read` reads the status register. `#` and `;` start a
//! comment.
//!
//! [`Replayer`] drives an [`Apu`] through a trace the way a running emulator
//! would: every video frame (from [`FrameClock`]) gets a mid-frame forced
//! update and an end-of-frame synchronization, and the producer clock is
//! rebased after each frame.

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case};
use nom::character::complete::{digit1, hex_digit1, space0, space1};
use nom::combinator::{all_consuming, map_res, opt, value};
use nom::sequence::{pair, preceded, separated_pair, terminated, tuple};
use nom::IResult;
use serde::Serialize;
use std::io::Write;

use crate::apu::Apu;
use crate::frame_clock::FrameClock;
use crate::memory::SampleMemory;
use crate::sink::{CommittedSlot, SynthSink};
use crate::{ApuError, Result};

/// Bus address of register 0
const APU_BASE: u32 = 0x4000;
/// Highest register offset
const LAST_REGISTER: u32 = 0x17;

/// What a trace line does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    /// Register write (offset from 0x4000)
    Write {
        /// Register offset
        register: u16,
        /// Written value
        value: u8,
    },
    /// Status register read
    ReadStatus,
}

/// One timestamped APU access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    /// Absolute CPU cycle
    pub cycle: u64,
    /// Access
    pub op: TraceOp,
}

fn hex_number(input: &str) -> IResult<&str, u32> {
    preceded(
        opt(alt((tag("$"), tag_no_case("0x")))),
        map_res(hex_digit1, |digits| u32::from_str_radix(digits, 16)),
    )(input)
}

fn cycle(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |digits: &str| digits.parse::<u64>())(input)
}

fn write_op(input: &str) -> IResult<&str, TraceOp> {
    map_res(
        tuple((hex_number, space1, opt(pair(tag("="), space0)), hex_number)),
        |(register, _, _, value)| {
            let register = if (APU_BASE..=APU_BASE + LAST_REGISTER).contains(&register) {
                register - APU_BASE
            } else if register <= LAST_REGISTER {
                register
            } else {
                return Err("register outside $4000-$4017");
            };
            let value = u8::try_from(value).map_err(|_| "value does not fit in a byte")?;
            Ok(TraceOp::Write {
                register: register as u16,
                value,
            })
        },
    )(input)
}

fn trace_line(input: &str) -> IResult<&str, TraceEvent> {
    let op = alt((value(TraceOp::ReadStatus, tag_no_case("read")), write_op));
    let (rest, (at, op)) =
        all_consuming(terminated(separated_pair(cycle, space1, op), space0))(input)?;
    Ok((rest, TraceEvent { cycle: at, op }))
}

/// Parse a whole trace. Blank lines and comments are skipped.
pub fn parse_trace(text: &str) -> Result<Vec<TraceEvent>> {
    let mut events: Vec<TraceEvent> = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.split(['#', ';']).next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let (_, event) = trace_line(content).map_err(|e| ApuError::TraceParse {
            line,
            msg: format!("cannot parse {content:?}: {e}"),
        })?;

        if let Some(previous) = events.last() {
            if event.cycle < previous.cycle {
                return Err(ApuError::TraceParse {
                    line,
                    msg: format!(
                        "cycle {} is earlier than the previous access at {}",
                        event.cycle, previous.cycle
                    ),
                });
            }
        }
        events.push(event);
    }
    Ok(events)
}

/// Status register read observed during a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRead {
    /// Absolute CPU cycle of the read
    pub cycle: u64,
    /// Value returned
    pub value: u8,
}

/// Outcome of a replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Completed video frames
    pub frames: u64,
    /// Accesses applied
    pub events: usize,
    /// Status reads, in order
    pub status_reads: Vec<StatusRead>,
    /// Sum of every rebase adjustment
    pub rebased_cycles: u64,
}

/// Drives an engine through a trace with video-frame synchronization
pub struct Replayer<S: SynthSink, M: SampleMemory> {
    apu: Apu<S, M>,
    clock: FrameClock,
    halves: [u32; 2],
    half: usize,
    base: u64,
    boundary: u64,
    summary: ReplaySummary,
}

impl<S: SynthSink, M: SampleMemory> Replayer<S, M> {
    /// Start replaying into `apu` at absolute cycle 0
    pub fn new(apu: Apu<S, M>) -> Self {
        let mut clock = FrameClock::new(apu.config().region);
        let halves = clock.next_frame();
        Replayer {
            apu,
            clock,
            halves,
            half: 0,
            base: 0,
            boundary: halves[0] as u64,
            summary: ReplaySummary::default(),
        }
    }

    /// Apply every event, then finish the frame the last one fell in
    pub fn run(&mut self, events: &[TraceEvent]) -> &ReplaySummary {
        for event in events {
            self.apply(event);
        }
        self.finish_frame();
        &self.summary
    }

    /// Apply one event, completing any frame halves that end before it
    pub fn apply(&mut self, event: &TraceEvent) {
        self.advance_to(event.cycle);
        let timestamp = self.local(event.cycle);
        match event.op {
            TraceOp::Write { register, value } => self.apu.write(timestamp, register, value),
            TraceOp::ReadStatus => {
                let value = self.apu.read_status(timestamp);
                self.summary.status_reads.push(StatusRead {
                    cycle: event.cycle,
                    value,
                });
            }
        }
        self.summary.events += 1;
    }

    /// Run frame halves until every boundary at or before `cycle` is done
    pub fn advance_to(&mut self, cycle: u64) {
        while cycle >= self.boundary {
            self.finish_half();
        }
    }

    /// Run to the end of the current video frame
    pub fn finish_frame(&mut self) {
        let frames = self.summary.frames;
        while self.summary.frames == frames {
            self.finish_half();
        }
    }

    /// Summary so far
    pub fn summary(&self) -> &ReplaySummary {
        &self.summary
    }

    /// Engine being driven
    pub fn apu(&self) -> &Apu<S, M> {
        &self.apu
    }

    /// Stop replaying and hand back the engine
    pub fn into_apu(self) -> Apu<S, M> {
        self.apu
    }

    fn local(&self, cycle: u64) -> u32 {
        (cycle - self.base) as u32
    }

    fn finish_half(&mut self) {
        let timestamp = self.local(self.boundary);
        if self.half == 0 {
            self.apu.force_update(timestamp);
            self.half = 1;
            self.boundary += self.halves[1] as u64;
        } else {
            let adjustment = self.apu.end_of_frame(timestamp);
            self.base += adjustment as u64;
            self.summary.rebased_cycles += adjustment as u64;
            self.summary.frames += 1;
            self.halves = self.clock.next_frame();
            self.half = 0;
            self.boundary += self.halves[0] as u64;
        }
    }
}

#[derive(Serialize)]
struct SlotRecord {
    cursor: u16,
    sample_index: u16,
    pulse0: String,
    pulse1: String,
    triangle_noise: String,
    mode: String,
    control: u8,
}

impl From<&CommittedSlot> for SlotRecord {
    fn from(slot: &CommittedSlot) -> Self {
        SlotRecord {
            cursor: slot.cursor,
            sample_index: slot.sample_index,
            pulse0: format!("{:04X}", slot.words[0]),
            pulse1: format!("{:04X}", slot.words[1]),
            triangle_noise: format!("{:04X}", slot.words[2]),
            mode: format!("{:04X}", slot.words[3]),
            control: slot.control.bits(),
        }
    }
}

#[derive(Serialize)]
struct PcmRecord {
    sample_index: u16,
    delta: i8,
}

fn csv_error(e: csv::Error) -> ApuError {
    ApuError::Csv(e.to_string())
}

/// Write committed slots as CSV with a header row
pub fn write_slots_csv<W: Write>(slots: &[CommittedSlot], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for slot in slots {
        csv.serialize(SlotRecord::from(slot)).map_err(csv_error)?;
    }
    csv.flush()?;
    Ok(())
}

/// Write PCM delta entries as CSV, deltas shown as signed values
pub fn write_pcm_csv<W: Write>(entries: &[(u16, u8)], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for &(sample_index, delta) in entries {
        csv.serialize(PcmRecord {
            sample_index,
            delta: delta as i8,
        })
        .map_err(csv_error)?;
    }
    csv.flush()?;
    Ok(())
}
