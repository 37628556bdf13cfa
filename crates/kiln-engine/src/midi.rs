//! Timestamped raw MIDI output queue.
//!
//! Tracks with the MIDI archetype emit no audio; their fired steps
//! become note on/off pairs here instead. Events carry the output
//! frame they belong to and the host converts frames to its own time
//! base when forwarding bytes to a device.

/// Hard cap on queued events. Overflow drops the event so a host that
/// stops draining loses MIDI rather than growing the queue.
const MIDI_QUEUE_CAP: usize = 1024;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const CONTROL_CHANGE: u8 = 0xB0;
const CC_ALL_NOTES_OFF: u8 = 123;

/// One raw 3-byte MIDI message: `[status | channel, data1, data2]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    pub frame: u64,
    pub data: [u8; 3],
}

impl MidiEvent {
    /// Note-on with velocity mapped from 0..1 to 0..127. Channels
    /// outside 0..=15 and notes outside 0..=127 are dropped.
    pub fn note_on(frame: u64, channel: u8, note: u8, velocity: f32) -> Option<Self> {
        if channel > 15 || note > 127 {
            return None;
        }
        let velocity = if velocity.is_finite() { velocity.clamp(0.0, 1.0) } else { 1.0 };
        let vel = (velocity * 127.0).round() as u8;
        Some(Self { frame, data: [NOTE_ON | channel, note, vel] })
    }

    pub fn note_off(frame: u64, channel: u8, note: u8) -> Option<Self> {
        if channel > 15 || note > 127 {
            return None;
        }
        Some(Self { frame, data: [NOTE_OFF | channel, note, 0] })
    }

    /// The all-notes-off broadcast sent on transport stop.
    pub fn all_notes_off(frame: u64, channel: u8) -> Option<Self> {
        if channel > 15 {
            return None;
        }
        Some(Self { frame, data: [CONTROL_CHANGE | channel, CC_ALL_NOTES_OFF, 0] })
    }

    pub fn status(&self) -> u8 {
        self.data[0] & 0xF0
    }

    pub fn channel(&self) -> u8 {
        self.data[0] & 0x0F
    }
}

/// Frame-ordered queue of outbound MIDI messages.
///
/// Storage is fixed-capacity so pushing from the render path never
/// allocates. Insertion keeps the queue sorted; the drain path
/// advances a cursor and compacts lazily.
#[derive(Clone, Debug, Default)]
pub struct MidiQueue {
    events: heapless::Vec<MidiEvent, MIDI_QUEUE_CAP>,
    cursor: usize,
}

impl MidiQueue {
    pub fn new() -> Self {
        Self { events: heapless::Vec::new(), cursor: 0 }
    }

    /// Queue an event, keeping frame order. Equal frames keep their
    /// push order. Drops the event when the queue is full.
    pub fn push(&mut self, event: MidiEvent) {
        if self.events.is_full() {
            return;
        }
        let at = self.events.partition_point(|e| e.frame <= event.frame);
        let _ = self.events.insert(at, event);
    }

    /// Move every event due by `frame` into `out`, oldest first.
    pub fn drain_due(&mut self, frame: u64, out: &mut Vec<MidiEvent>) {
        while self.cursor < self.events.len() && self.events[self.cursor].frame <= frame {
            out.push(self.events[self.cursor]);
            self.cursor += 1;
        }
        if self.cursor == self.events.len() {
            self.events.clear();
            self.cursor = 0;
        } else if self.cursor > 128 {
            let remaining = self.events.len() - self.cursor;
            self.events.copy_within(self.cursor.., 0);
            self.events.truncate(remaining);
            self.cursor = 0;
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.events.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
